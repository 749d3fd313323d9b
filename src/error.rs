//! Error taxonomy.
//!
//! Configuration loading and builder validation return these as `Err`.
//! On the enrichment path every variant is folded into a property value
//! (omission, empty string, the last good snapshot or the identity sentinel).

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichError {
    /// A context field could not be determined.
    #[error("context field unavailable: {field}")]
    ContextUnavailable { field: String },

    /// Identity resolution failed for any reason.
    #[error("{0}")]
    IdentityUnavailable(String),

    /// An external call exceeded its budget.
    #[error("timeout")]
    Timeout(Duration),

    #[error("invalid property key: {0:?}")]
    InvalidPropertyKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EnrichError>;
