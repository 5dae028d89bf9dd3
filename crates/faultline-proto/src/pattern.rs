//! Event name matching for subscriptions and chaos rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pattern matched against event names.
///
/// Three forms are supported:
/// - `"*"` matches every event
/// - a trailing `*` matches by prefix, e.g. `"order.*"` or `"Price*"`
/// - anything else matches the name exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamePattern(String);

impl NamePattern {
    /// Creates a pattern from its string form.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// Checks whether the given event name matches this pattern.
    pub fn matches(&self, name: &str) -> bool {
        if self.0 == "*" {
            return true;
        }
        if let Some(prefix) = self.0.strip_suffix('*') {
            return name.starts_with(prefix);
        }
        name == self.0
    }

    /// Returns the raw pattern string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NamePattern {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}

impl From<String> for NamePattern {
    fn from(pattern: String) -> Self {
        Self::new(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let pattern = NamePattern::new("task.start");
        assert!(pattern.matches("task.start"));
        assert!(!pattern.matches("task.started"));
        assert!(!pattern.matches("task"));
    }

    #[test]
    fn test_wildcard_all() {
        let pattern = NamePattern::new("*");
        assert!(pattern.matches("anything"));
        assert!(pattern.matches(""));
    }

    #[test]
    fn test_prefix_match() {
        let pattern = NamePattern::new("order.*");
        assert!(pattern.matches("order.filled"));
        assert!(pattern.matches("order.cancelled"));
        assert!(!pattern.matches("trade.filled"));

        let bare = NamePattern::new("Price*");
        assert!(bare.matches("PriceFetched"));
        assert!(bare.matches("Price"));
        assert!(!bare.matches("LastPrice"));
    }

    #[test]
    fn test_serde_transparent() {
        let pattern: NamePattern = serde_json::from_str(r#""task.*""#).unwrap();
        assert_eq!(pattern.as_str(), "task.*");
        assert_eq!(serde_json::to_string(&pattern).unwrap(), r#""task.*""#);
    }
}
