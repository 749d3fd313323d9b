//! Enrichment configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. JSON file named by `LOGENRICH_CONFIG`
//! 3. Individual `LOGENRICH_*` environment overrides

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::snapshot::MissingFieldPolicy;
use crate::error::{EnrichError, Result};
use crate::identity::resolver::DEFAULT_IDENTITY_ENV_VARS;
use crate::security::sanitizer::{is_valid_property_key, DEFAULT_MAX_VALUE_LEN};

/// Property written with the current user.
pub const DEFAULT_IDENTITY_KEY: &str = "executed_by";

/// Written instead of the user when identity cannot be resolved.
/// Existing log consumers match on this exact string.
pub const DEFAULT_SENTINEL: &str = "NULL";

pub const ENV_CONFIG_PATH: &str = "LOGENRICH_CONFIG";
pub const ENV_IDENTITY_KEY: &str = "LOGENRICH_IDENTITY_KEY";
pub const ENV_SENTINEL: &str = "LOGENRICH_SENTINEL";
pub const ENV_IDENTITY_TIMEOUT_MS: &str = "LOGENRICH_IDENTITY_TIMEOUT_MS";
pub const ENV_SNAPSHOT_TTL_MS: &str = "LOGENRICH_SNAPSHOT_TTL_MS";

/// Smallest accepted `max_value_len`; leaves room for the truncation marker.
const MIN_VALUE_LEN: usize = 16;

/// Largest accepted lookup budget. Budgets exist to keep logging calls short.
pub const MAX_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichmentConfig {
    /// Name used in diagnostics.
    pub pipeline_name: String,
    pub identity_key: String,
    pub sentinel: String,
    pub identity_timeout_ms: u64,
    pub identity_workers: usize,
    pub identity_queue: usize,
    /// Cache resolved identities for this long; `None` resolves every call.
    pub identity_ttl_ms: Option<u64>,
    pub identity_failure_ttl_ms: u64,
    /// Cache context snapshots for this long; `None` snapshots every call.
    pub snapshot_ttl_ms: Option<u64>,
    pub snapshot_timeout_ms: u64,
    pub missing_fields: MissingFieldPolicy,
    pub max_value_len: usize,
    /// `ENV_VAR -> property_key`
    pub env_context: BTreeMap<String, String>,
    pub identity_env_vars: Vec<String>,
    pub include_process_context: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            pipeline_name: "default".to_string(),
            identity_key: DEFAULT_IDENTITY_KEY.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            identity_timeout_ms: 250,
            identity_workers: 2,
            identity_queue: 64,
            identity_ttl_ms: Some(60_000),
            identity_failure_ttl_ms: 5_000,
            snapshot_ttl_ms: Some(1_000),
            snapshot_timeout_ms: 100,
            missing_fields: MissingFieldPolicy::Omit,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
            env_context: BTreeMap::new(),
            identity_env_vars: DEFAULT_IDENTITY_ENV_VARS
                .iter()
                .map(|v| v.to_string())
                .collect(),
            include_process_context: true,
        }
    }
}

impl EnrichmentConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_PATH) {
            Some(path) if !path.is_empty() => {
                log::info!("CONFIG_LOADING path={}", path);
                Self::from_json_file(&path)?
            }
            _ => Self::default(),
        };

        if let Some(key) = lookup(ENV_IDENTITY_KEY) {
            config.identity_key = key;
        }
        if let Some(sentinel) = lookup(ENV_SENTINEL) {
            config.sentinel = sentinel;
        }
        if let Some(ms) = lookup(ENV_IDENTITY_TIMEOUT_MS) {
            config.identity_timeout_ms = parse_ms(ENV_IDENTITY_TIMEOUT_MS, &ms)?;
        }
        if let Some(ms) = lookup(ENV_SNAPSHOT_TTL_MS) {
            config.snapshot_ttl_ms = match parse_ms(ENV_SNAPSHOT_TTL_MS, &ms)? {
                0 => None,
                ms => Some(ms),
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_property_key(&self.identity_key) {
            return Err(EnrichError::InvalidPropertyKey(self.identity_key.clone()));
        }
        let mut targets = HashSet::new();
        for key in self.env_context.values() {
            if !is_valid_property_key(key) {
                return Err(EnrichError::InvalidPropertyKey(key.clone()));
            }
            if !targets.insert(key.as_str()) {
                return Err(EnrichError::Config(format!(
                    "property key {:?} is mapped from more than one variable",
                    key
                )));
            }
        }
        if self.sentinel.chars().any(char::is_control) {
            return Err(EnrichError::Config(
                "sentinel must not contain control characters".to_string(),
            ));
        }
        check_timeout("identity_timeout_ms", self.identity_timeout_ms)?;
        check_timeout("snapshot_timeout_ms", self.snapshot_timeout_ms)?;
        if self.identity_workers == 0 {
            return Err(EnrichError::Config(
                "identity_workers must be greater than zero".to_string(),
            ));
        }
        if self.max_value_len < MIN_VALUE_LEN {
            return Err(EnrichError::Config(format!(
                "max_value_len must be at least {}",
                MIN_VALUE_LEN
            )));
        }
        Ok(())
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }

    pub fn identity_ttl(&self) -> Option<Duration> {
        self.identity_ttl_ms.map(Duration::from_millis)
    }

    pub fn identity_failure_ttl(&self) -> Duration {
        Duration::from_millis(self.identity_failure_ttl_ms)
    }

    pub fn snapshot_ttl(&self) -> Option<Duration> {
        self.snapshot_ttl_ms.map(Duration::from_millis)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}

fn check_timeout(field: &str, ms: u64) -> Result<()> {
    if ms == 0 || ms > MAX_TIMEOUT_MS {
        return Err(EnrichError::Config(format!(
            "{} must be between 1 and {}, got {}",
            field, MAX_TIMEOUT_MS, ms
        )));
    }
    Ok(())
}

fn parse_ms(var: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| EnrichError::Config(format!("{} must be milliseconds, got {:?}", var, raw)))
}
