//! Device event model.

use serde::{Deserialize, Serialize};

/// Trait for decoded values that carry an event identifier.
///
/// The identifier is stamped onto the pipeline context so the source
/// message can later be marked as handled.
pub trait HasEventId {
    /// Returns the event identifier, if this value has one.
    fn event_id(&self) -> Option<String> {
        None
    }
}

/// A batch of readings reported by one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub origin: i64,
    #[serde(default)]
    pub readings: Vec<Reading>,
}

/// A single named value read from a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub device: String,
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub origin: i64,
}

impl Event {
    /// Create an empty event for a device.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Append a reading attributed to this event's device.
    pub fn with_reading(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.readings.push(Reading {
            device: self.device.clone(),
            name: name.into(),
            value: value.into(),
            origin: self.origin,
            ..Default::default()
        });
        self
    }
}

impl HasEventId for Event {
    fn event_id(&self) -> Option<String> {
        if self.id.is_empty() {
            None
        } else {
            Some(self.id.clone())
        }
    }
}

impl HasEventId for serde_json::Value {}

impl HasEventId for String {}
