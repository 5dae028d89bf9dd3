//! Error types for the scenario engine.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the scenario engine.
///
/// `Execution`, `Configuration`, and `Io` abort a running scenario;
/// `Timing` is captured into the failing step's result unless the engine
/// is configured with fatal timeouts.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed descriptors or options, fatal at load.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A bounded wait elapsed without the expected event.
    #[error("timed out waiting for {what} after {timeout_ms}ms")]
    Timing { what: String, timeout_ms: u64 },

    /// A chaos rule could not be applied as configured.
    #[error("injection error: {0}")]
    Injection(String),

    /// A user-supplied action failed.
    #[error("action '{action}' failed: {reason}")]
    Execution { action: String, reason: String },

    /// A recording file exists but does not parse as a valid recording.
    #[error("corrupt recording {path}: {reason}")]
    CorruptRecording { path: PathBuf, reason: String },

    /// Save/load failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true when this error aborts a running scenario rather than
    /// being captured into a single step's result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Execution { .. }
                | Error::Configuration(_)
                | Error::Io(_)
                | Error::CorruptRecording { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failure() {
        let err = Error::Timing {
            what: "event 'DataProcessed'".to_string(),
            timeout_ms: 500,
        };
        assert_eq!(
            err.to_string(),
            "timed out waiting for event 'DataProcessed' after 500ms"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(
            Error::Execution {
                action: "poke".into(),
                reason: "boom".into()
            }
            .is_fatal()
        );
        assert!(Error::Configuration("bad speed".into()).is_fatal());
        assert!(
            !Error::Timing {
                what: "x".into(),
                timeout_ms: 1
            }
            .is_fatal()
        );
        assert!(!Error::Injection("missing field".into()).is_fatal());
    }
}
