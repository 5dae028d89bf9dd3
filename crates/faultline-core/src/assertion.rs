//! Declarative assertions over recorded event history.
//!
//! Assertions are checked read-only against the history accumulated so
//! far; a failing assertion never stops evaluation of the rest of the
//! batch.

use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;

use crate::recorder::RecordedEvent;

/// User predicate for [`Assertion::Custom`], returning pass/fail and a
/// human-readable message.
pub type CustomCheck = Arc<dyn Fn(&[RecordedEvent]) -> (bool, String) + Send + Sync>;

/// A declarative check against recorded history.
#[derive(Clone)]
pub enum Assertion {
    /// The named event occurred between `min` and `max` times, or exactly
    /// `exact` times (`exact` overrides the bounds).
    EventCount {
        event_name: String,
        min: Option<usize>,
        max: Option<usize>,
        exact: Option<usize>,
    },
    /// The expected names occurred in order. With `allow_gaps`, unrelated
    /// events may interleave; without, some contiguous run of events must
    /// match the expected names exactly.
    EventSequence {
        expected: Vec<String>,
        allow_gaps: bool,
    },
    /// The named event never occurred.
    NoEvent { event_name: String },
    /// Delegates to a user predicate over the full history.
    Custom { name: String, check: CustomCheck },
}

impl Assertion {
    /// Asserts the event occurred exactly `count` times.
    pub fn exact_count(event_name: impl Into<String>, count: usize) -> Self {
        Assertion::EventCount {
            event_name: event_name.into(),
            min: None,
            max: None,
            exact: Some(count),
        }
    }

    /// Asserts the event occurred at least `count` times.
    pub fn min_count(event_name: impl Into<String>, count: usize) -> Self {
        Assertion::EventCount {
            event_name: event_name.into(),
            min: Some(count),
            max: None,
            exact: None,
        }
    }

    /// Asserts the event occurred at most `count` times.
    pub fn max_count(event_name: impl Into<String>, count: usize) -> Self {
        Assertion::EventCount {
            event_name: event_name.into(),
            min: None,
            max: Some(count),
            exact: None,
        }
    }

    /// Asserts the events occurred in order.
    pub fn sequence<S: Into<String>>(expected: impl IntoIterator<Item = S>, allow_gaps: bool) -> Self {
        Assertion::EventSequence {
            expected: expected.into_iter().map(Into::into).collect(),
            allow_gaps,
        }
    }

    /// Asserts the event never occurred.
    pub fn no_event(event_name: impl Into<String>) -> Self {
        Assertion::NoEvent {
            event_name: event_name.into(),
        }
    }

    /// Wraps a user predicate as an assertion.
    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&[RecordedEvent]) -> (bool, String) + Send + Sync + 'static,
    {
        Assertion::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Stable name used in results and reports.
    pub fn name(&self) -> String {
        match self {
            Assertion::EventCount { event_name, .. } => format!("event_count.{event_name}"),
            Assertion::EventSequence { expected, .. } => {
                format!("event_sequence.{}_events", expected.len())
            }
            Assertion::NoEvent { event_name } => format!("no_event.{event_name}"),
            Assertion::Custom { name, .. } => name.clone(),
        }
    }

    /// Checks this assertion against the history.
    pub fn check(&self, history: &[RecordedEvent]) -> AssertionResult {
        match self {
            Assertion::EventCount {
                event_name,
                min,
                max,
                exact,
            } => check_event_count(self.name(), history, event_name, *min, *max, *exact),
            Assertion::EventSequence {
                expected,
                allow_gaps,
            } => check_event_sequence(self.name(), history, expected, *allow_gaps),
            Assertion::NoEvent { event_name } => {
                let count = count_by_name(history, event_name);
                AssertionResult {
                    name: self.name(),
                    passed: count == 0,
                    message: format!("Expected no {event_name} events, found {count}"),
                    expected: Some(json!(0)),
                    actual: Some(json!(count)),
                }
            }
            Assertion::Custom { name, check } => {
                let (passed, message) = check(history);
                AssertionResult {
                    name: name.clone(),
                    passed,
                    message,
                    expected: None,
                    actual: None,
                }
            }
        }
    }
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::EventCount {
                event_name,
                min,
                max,
                exact,
            } => f
                .debug_struct("EventCount")
                .field("event_name", event_name)
                .field("min", min)
                .field("max", max)
                .field("exact", exact)
                .finish(),
            Assertion::EventSequence {
                expected,
                allow_gaps,
            } => f
                .debug_struct("EventSequence")
                .field("expected", expected)
                .field("allow_gaps", allow_gaps)
                .finish(),
            Assertion::NoEvent { event_name } => f
                .debug_struct("NoEvent")
                .field("event_name", event_name)
                .finish(),
            Assertion::Custom { name, .. } => {
                f.debug_struct("Custom").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

/// Outcome of a single assertion check.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssertionResult {
    /// Assertion name.
    pub name: String,
    /// Whether it passed.
    pub passed: bool,
    /// Human-readable message.
    pub message: String,
    /// Expected value, when meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// Actual value, when meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

/// Checks every assertion against the history.
///
/// All checks run even when earlier ones fail.
pub fn check_assertions(history: &[RecordedEvent], assertions: &[Assertion]) -> Vec<AssertionResult> {
    assertions.iter().map(|a| a.check(history)).collect()
}

fn count_by_name(history: &[RecordedEvent], event_name: &str) -> usize {
    history.iter().filter(|e| e.event_name == event_name).count()
}

fn check_event_count(
    name: String,
    history: &[RecordedEvent],
    event_name: &str,
    min: Option<usize>,
    max: Option<usize>,
    exact: Option<usize>,
) -> AssertionResult {
    let count = count_by_name(history, event_name);

    if let Some(exact) = exact {
        return AssertionResult {
            name,
            passed: count == exact,
            message: format!("Expected exactly {exact} {event_name} events, got {count}"),
            expected: Some(json!(exact)),
            actual: Some(json!(count)),
        };
    }

    let mut failures = Vec::new();
    if let Some(min) = min
        && count < min
    {
        failures.push(format!("expected at least {min}, got {count}"));
    }
    if let Some(max) = max
        && count > max
    {
        failures.push(format!("expected at most {max}, got {count}"));
    }

    let passed = failures.is_empty();
    let message = if passed {
        format!("{event_name} occurred {count} times (OK)")
    } else {
        format!("{event_name}: {}", failures.join("; "))
    };

    AssertionResult {
        name,
        passed,
        message,
        expected: Some(json!({"min": min, "max": max})),
        actual: Some(json!(count)),
    }
}

fn check_event_sequence(
    name: String,
    history: &[RecordedEvent],
    expected: &[String],
    allow_gaps: bool,
) -> AssertionResult {
    if expected.is_empty() {
        return AssertionResult {
            name,
            passed: true,
            message: "empty sequence trivially matches".to_string(),
            expected: Some(json!([])),
            actual: None,
        };
    }

    let names: Vec<&str> = history.iter().map(|e| e.event_name.as_str()).collect();

    // `matched` counts how far into the expected sequence the best
    // attempt got; on failure it is the first mismatch index.
    let matched = if allow_gaps {
        let mut index = 0;
        for event_name in &names {
            if index < expected.len() && *event_name == expected[index] {
                index += 1;
            }
        }
        index
    } else {
        let mut best = 0;
        for start in 0..names.len() {
            if names[start] != expected[0] {
                continue;
            }
            let mut run = 0;
            while run < expected.len()
                && start + run < names.len()
                && names[start + run] == expected[run]
            {
                run += 1;
            }
            best = best.max(run);
            if best == expected.len() {
                break;
            }
        }
        best
    };

    let passed = matched == expected.len();
    let message = if passed {
        format!("sequence of {} events occurred in order", expected.len())
    } else {
        format!(
            "sequence broken at index {matched}: expected '{}' {}",
            expected[matched.min(expected.len() - 1)],
            if allow_gaps {
                "to occur after its predecessors"
            } else {
                "immediately after its predecessor"
            }
        )
    };

    AssertionResult {
        name,
        passed,
        message,
        expected: Some(json!(expected)),
        actual: Some(json!(matched)),
    }
}
