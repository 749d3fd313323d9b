//! Log context enrichment pipeline.
//!
//! For every record:
//! 1. Take a context snapshot and merge it into the property bag
//! 2. Resolve each identity binding and write the value or the sentinel
//! 3. Hand the record back; there is no reject outcome
//!
//! Identity bindings are applied after the snapshot, so an identity key
//! overwrites a snapshot key of the same name.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{EnrichmentConfig, DEFAULT_IDENTITY_KEY, DEFAULT_SENTINEL};
use crate::context::cached::CachedContextProvider;
use crate::context::provider::{
    catch_snapshot, CompositeContextProvider, ContextSnapshotProvider, EnvContextProvider,
    ProcessContextProvider, StaticContextProvider,
};
use crate::context::timeout::{
    TimeoutContextProvider, DEFAULT_SNAPSHOT_QUEUE, DEFAULT_SNAPSHOT_WORKERS,
};
use crate::error::{EnrichError, Result};
use crate::identity::cached::CachedIdentityResolver;
use crate::identity::resolver::{catch_resolve, EnvIdentityResolver, IdentityResolver};
use crate::identity::result::IdentityResult;
use crate::identity::timeout::TimeoutResolver;
use crate::logging::structured::LogContext;
use crate::pipeline::record::LogRecord;
use crate::security::sanitizer::{
    is_valid_property_key, sanitize_value, SanitizationResult, DEFAULT_MAX_VALUE_LEN,
};

/// A resolver and the property it writes.
#[derive(Clone)]
pub struct IdentityBinding {
    pub key: String,
    pub resolver: Arc<dyn IdentityResolver>,
}

impl std::fmt::Debug for IdentityBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityBinding")
            .field("key", &self.key)
            .field("resolver", &self.resolver.name())
            .finish()
    }
}

/// Stateless, thread-safe enrichment of log records.
pub struct EnrichmentPipeline {
    provider: Arc<dyn ContextSnapshotProvider>,
    bindings: Vec<IdentityBinding>,
    sentinel: String,
    max_value_len: usize,
    ctx: LogContext,
}

impl EnrichmentPipeline {
    pub fn builder() -> EnrichmentPipelineBuilder {
        EnrichmentPipelineBuilder::default()
    }

    /// Build the standard pipeline described by `config`: process and
    /// environment context, and the current user from the environment.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let ctx = LogContext::new(&config.pipeline_name);
        let env_user = Arc::new(EnvIdentityResolver::new(
            config.identity_env_vars.iter().cloned(),
        ));
        let resolver = bound_resolver(config, env_user, &ctx)?;

        let pipeline = Self::builder()
            .with_config(config)
            .context_provider(context_provider(config, None, &ctx)?)
            .identity(&config.identity_key, resolver)
            .build()?;

        log::info!(
            "{} PIPELINE_READY identity_key={} sentinel={:?} snapshot_ttl_ms={:?} identity_ttl_ms={:?}",
            pipeline.ctx,
            config.identity_key,
            config.sentinel,
            config.snapshot_ttl_ms,
            config.identity_ttl_ms
        );
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.ctx.pipeline
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn bindings(&self) -> &[IdentityBinding] {
        &self.bindings
    }

    /// Enrich `record` in place. Never fails and never drops the record.
    pub fn enrich(&self, record: &mut LogRecord) {
        let snapshot = catch_snapshot(self.provider.as_ref(), &self.ctx);
        for (key, value) in snapshot.iter() {
            record.set_property(key, value);
        }

        for binding in &self.bindings {
            let result = catch_resolve(binding.resolver.as_ref(), &self.ctx);
            match &result {
                IdentityResult::Resolved(value) => {
                    let mut detections = SanitizationResult::default();
                    let value = sanitize_value(value, self.max_value_len, &mut detections);
                    record.set_property(&binding.key, &value);
                }
                IdentityResult::Unavailable(reason) => {
                    log::trace!(
                        "{} IDENTITY_SENTINEL key={} resolver={} reason={:?}",
                        self.ctx,
                        binding.key,
                        binding.resolver.name(),
                        reason
                    );
                    record.set_property(&binding.key, &self.sentinel);
                }
            }
        }
    }

    /// Owned-record form of [`enrich`](Self::enrich).
    pub fn enriched(&self, mut record: LogRecord) -> LogRecord {
        self.enrich(&mut record);
        record
    }
}

/// Context provider described by `config`, with an optional host-runtime
/// provider merged last (its keys win). Snapshots are bounded by
/// `snapshot_timeout_ms` and optionally cached.
pub fn context_provider(
    config: &EnrichmentConfig,
    runtime: Option<Arc<dyn ContextSnapshotProvider>>,
    ctx: &LogContext,
) -> Result<Arc<dyn ContextSnapshotProvider>> {
    let mut composite = CompositeContextProvider::new("context");
    if config.include_process_context {
        composite = composite.with_provider(Arc::new(ProcessContextProvider::new(
            config.missing_fields,
        )));
    }
    if !config.env_context.is_empty() {
        composite = composite.with_provider(Arc::new(
            EnvContextProvider::new(config.env_context.clone())
                .with_policy(config.missing_fields)
                .with_max_value_len(config.max_value_len)
                .with_log_context(ctx.clone()),
        ));
    }
    if let Some(runtime) = runtime {
        composite = composite.with_provider(runtime);
    }

    let bounded: Arc<dyn ContextSnapshotProvider> = Arc::new(TimeoutContextProvider::with_pool(
        Arc::new(composite),
        config.snapshot_timeout(),
        DEFAULT_SNAPSHOT_WORKERS,
        DEFAULT_SNAPSHOT_QUEUE,
        ctx,
    )?);
    let provider: Arc<dyn ContextSnapshotProvider> = match config.snapshot_ttl() {
        Some(ttl) => Arc::new(
            CachedContextProvider::new(bounded, ttl)
                .with_log_context(ctx)
                .primed(),
        ),
        None => bounded,
    };
    Ok(provider)
}

/// Wrap `resolver` with the time budget and cache described by `config`.
pub fn bound_resolver(
    config: &EnrichmentConfig,
    resolver: Arc<dyn IdentityResolver>,
    ctx: &LogContext,
) -> Result<Arc<dyn IdentityResolver>> {
    let bounded: Arc<dyn IdentityResolver> = Arc::new(TimeoutResolver::with_pool(
        resolver,
        config.identity_timeout(),
        config.identity_workers,
        config.identity_queue,
        ctx,
    )?);
    let resolver: Arc<dyn IdentityResolver> = match config.identity_ttl() {
        Some(ttl) => Arc::new(
            CachedIdentityResolver::new(bounded, ttl)
                .with_failure_ttl(config.identity_failure_ttl())
                .with_log_context(ctx),
        ),
        None => bounded,
    };
    Ok(resolver)
}

pub struct EnrichmentPipelineBuilder {
    name: String,
    provider: Option<Arc<dyn ContextSnapshotProvider>>,
    bindings: Vec<IdentityBinding>,
    sentinel: String,
    max_value_len: usize,
}

impl Default for EnrichmentPipelineBuilder {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            provider: None,
            bindings: Vec::new(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            max_value_len: DEFAULT_MAX_VALUE_LEN,
        }
    }
}

impl EnrichmentPipelineBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Take name, sentinel and value limit from `config`.
    pub fn with_config(mut self, config: &EnrichmentConfig) -> Self {
        self.name = config.pipeline_name.clone();
        self.sentinel = config.sentinel.clone();
        self.max_value_len = config.max_value_len;
        self
    }

    pub fn context_provider(mut self, provider: Arc<dyn ContextSnapshotProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Add an identity binding; bindings run in the order added.
    pub fn identity(mut self, key: &str, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.bindings.push(IdentityBinding {
            key: key.to_string(),
            resolver,
        });
        self
    }

    /// Bind `resolver` to the default identity key.
    pub fn default_identity(self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity(DEFAULT_IDENTITY_KEY, resolver)
    }

    pub fn sentinel(mut self, sentinel: &str) -> Self {
        self.sentinel = sentinel.to_string();
        self
    }

    pub fn max_value_len(mut self, max_value_len: usize) -> Self {
        self.max_value_len = max_value_len;
        self
    }

    pub fn build(self) -> Result<EnrichmentPipeline> {
        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if !is_valid_property_key(&binding.key) {
                return Err(EnrichError::InvalidPropertyKey(binding.key.clone()));
            }
            if !seen.insert(binding.key.as_str()) {
                return Err(EnrichError::Config(format!(
                    "identity key {:?} bound more than once",
                    binding.key
                )));
            }
        }
        if self.sentinel.chars().any(char::is_control) {
            return Err(EnrichError::Config(
                "sentinel must not contain control characters".to_string(),
            ));
        }

        let ctx = LogContext::new(&self.name);
        log::debug!(
            "{} PIPELINE_BUILT bindings={:?}",
            ctx,
            self.bindings.iter().map(|b| b.key.as_str()).collect::<Vec<_>>()
        );

        Ok(EnrichmentPipeline {
            provider: self
                .provider
                .unwrap_or_else(|| Arc::new(StaticContextProvider::empty())),
            bindings: self.bindings,
            sentinel: self.sentinel,
            max_value_len: self.max_value_len,
            ctx,
        })
    }
}
