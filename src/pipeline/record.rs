//! The log record seen by the pipeline.
//!
//! Message, level, target and timestamp belong to the logging framework;
//! the pipeline only adds or overwrites entries in the property bag.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::Level;

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    properties: BTreeMap<String, String>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            target: String::new(),
            message: message.into(),
            timestamp: Utc::now(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Insert or overwrite a property. Reuses the existing allocation and
    /// skips the write entirely when the value is unchanged.
    pub fn set_property(&mut self, key: &str, value: &str) {
        match self.properties.get_mut(key) {
            Some(existing) if existing.as_str() == value => {}
            Some(existing) => {
                existing.clear();
                existing.push_str(value);
            }
            None => {
                self.properties.insert(key.to_string(), value.to_string());
            }
        }
    }
}
