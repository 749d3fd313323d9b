//! Immutable context snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EnrichError;
use crate::logging::structured::LogContext;
use crate::security::sanitizer::sanitize_properties;

/// How a provider reports a context field it cannot determine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Leave the key out of the snapshot.
    #[default]
    Omit,
    /// Keep the key with an empty value.
    EmptyString,
}

/// Mapping of context keys to values, produced once and never mutated.
///
/// Cloning is cheap: the entries are shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    entries: Arc<BTreeMap<String, String>>,
}

impl ContextSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Combine two snapshots; on a shared key `other` wins.
    pub fn merged(&self, other: &ContextSnapshot) -> ContextSnapshot {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut entries = (*self.entries).clone();
        for (k, v) in other.entries.iter() {
            entries.insert(k.clone(), v.clone());
        }
        Self::from(entries)
    }
}

impl From<BTreeMap<String, String>> for ContextSnapshot {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ContextSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<BTreeMap<_, _>>();
        Self::from(entries)
    }
}

/// Collects fields of a snapshot, applying one [`MissingFieldPolicy`] to all
/// unknown fields and sanitizing everything on `build`.
#[derive(Debug)]
pub struct SnapshotBuilder {
    policy: MissingFieldPolicy,
    max_value_len: usize,
    fields: Vec<(String, String)>,
    missing: Vec<String>,
}

impl SnapshotBuilder {
    pub fn new(policy: MissingFieldPolicy, max_value_len: usize) -> Self {
        Self {
            policy,
            max_value_len,
            fields: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Record a field; `None` means the value is not known yet.
    pub fn field(&mut self, key: &str, value: Option<String>) -> &mut Self {
        match value {
            Some(v) => self.fields.push((key.to_string(), v)),
            None => {
                self.missing.push(key.to_string());
                if self.policy == MissingFieldPolicy::EmptyString {
                    self.fields.push((key.to_string(), String::new()));
                }
            }
        }
        self
    }

    /// Keys reported as unknown so far.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn build(self, ctx: &LogContext) -> ContextSnapshot {
        for field in &self.missing {
            let err = EnrichError::ContextUnavailable {
                field: field.clone(),
            };
            log::debug!("{} CONTEXT_UNAVAILABLE policy={:?} error={}", ctx, self.policy, err);
        }
        let (entries, _) = sanitize_properties(self.fields, self.max_value_len, ctx);
        ContextSnapshot::from(entries)
    }
}
