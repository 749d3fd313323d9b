//! logenrich-core - Failure-tolerant log context enrichment
//!
//! Attaches host-runtime context (cluster, session and application
//! identifiers) and the current user to every log record. The
//! implementation prioritizes:
//!
//! 1. **Never interfering with logging** - no enrichment failure reaches the caller
//! 2. **Bounded latency** - external lookups are time-boxed and cached
//! 3. **Testability** - every external source is an injected trait object
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `pipeline` - The enrichment orchestrator and the log record
//! - `context` - Context snapshots and their providers
//! - `identity` - Identity resolution with timeouts and caching
//! - `adapter` - `log` facade bridge and filter-style hook
//! - `security` - Key validation and value sanitization
//! - `config` - Configuration from JSON and environment
//! - `logging` - Structured diagnostics and the log line format
//! - `worker` - Worker pool that bounds calls into external sources

use std::sync::Arc;

pub mod adapter;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod logging;
pub mod pipeline;
pub mod security;
pub mod worker;

pub use adapter::{EnrichingLogger, EnrichmentFilter, FilterDecision};
pub use config::EnrichmentConfig;
pub use context::{ContextSnapshot, ContextSnapshotProvider};
pub use error::{EnrichError, Result};
pub use identity::{IdentityResolver, IdentityResult};
pub use pipeline::{EnrichmentPipeline, LogRecord};

/// Install the global logger: `env_logger` (filtered by `RUST_LOG`,
/// default `info`) behind an enrichment pipeline configured from the
/// environment.
pub fn init_logger() -> Result<Arc<EnrichmentPipeline>> {
    let config = EnrichmentConfig::from_env()?;
    init_logger_with(&config)
}

/// Same as [`init_logger`] with an explicit configuration.
pub fn init_logger_with(config: &EnrichmentConfig) -> Result<Arc<EnrichmentPipeline>> {
    let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(logging::structured::format_with_properties)
        .build();
    let max_level = inner.filter();

    let pipeline = Arc::new(EnrichmentPipeline::from_config(config)?);
    EnrichingLogger::new(inner, Arc::clone(&pipeline)).install(max_level)?;

    log::info!(
        "LOGGER_INSTALLED pipeline={} identity_key={} max_level={}",
        pipeline.name(),
        config.identity_key,
        max_level
    );
    Ok(pipeline)
}
