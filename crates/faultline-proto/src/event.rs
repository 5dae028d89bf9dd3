//! The event type flowing through the publish path.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single event published to the bus.
///
/// The payload is an arbitrary JSON value, usually an object mapping field
/// names to values. The source identifies the component that published the
/// event and travels with it through every wrapper on the publish path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event name, e.g. `"PriceFetched"` or `"order.filled"`.
    pub name: String,

    /// Structured payload; usually a field→value map.
    #[serde(default)]
    pub payload: Value,

    /// Component that published the event.
    #[serde(default)]
    pub source: String,
}

impl Event {
    /// Creates a new event with an empty payload and no source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
            source: String::new(),
        }
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Looks up a payload field by dot-separated path.
    ///
    /// Returns `None` when any path segment is missing or the value on the
    /// way is not an object.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut current = &self.payload;
        for part in path.split('.') {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}
