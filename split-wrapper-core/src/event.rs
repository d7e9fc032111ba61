//! Usage events and evaluation impressions queued for delivery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeValue;

const MAX_EVENT_TYPE_LEN: usize = 80;

/// An event as recorded by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub value: Option<f64>,
    pub properties: BTreeMap<String, AttributeValue>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            value: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Event types start with an alphanumeric character followed by up to 79
    /// alphanumerics or `-_.:`.
    pub fn has_valid_type(&self) -> bool {
        let mut chars = self.event_type.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphanumeric() => {}
            _ => return false,
        }
        self.event_type.len() <= MAX_EVENT_TYPE_LEN
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    }

    /// Stamp the event for one key and traffic type.
    pub fn record(&self, key: &str, traffic_type: &str, timestamp: i64) -> TrackedEvent {
        TrackedEvent {
            event_type_id: self.event_type.clone(),
            traffic_type_name: traffic_type.to_string(),
            key: key.to_string(),
            value: self.value,
            properties: self.properties.clone(),
            timestamp,
        }
    }
}

impl From<&str> for Event {
    fn from(event_type: &str) -> Self {
        Event::new(event_type)
    }
}

impl From<String> for Event {
    fn from(event_type: String) -> Self {
        Event::new(event_type)
    }
}

/// An event ready to be sent, attributed to a key and traffic type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    pub event_type_id: String,
    pub traffic_type_name: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, AttributeValue>,
    pub timestamp: i64,
}

/// Record that a key was evaluated to a treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impression {
    pub feature: String,
    pub key_name: String,
    pub treatment: String,
    pub time: i64,
}
