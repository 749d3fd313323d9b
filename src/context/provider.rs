//! Context snapshot providers.
//!
//! A provider is a side-effect-free view of process-wide state. It never
//! fails: whatever subset of its fields is known gets reported, unknown
//! fields follow the provider's [`MissingFieldPolicy`].

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use lazy_static::lazy_static;
use uuid::Uuid;

use crate::context::snapshot::{ContextSnapshot, MissingFieldPolicy, SnapshotBuilder};
use crate::error::{EnrichError, Result};
use crate::logging::structured::LogContext;
use crate::security::sanitizer::DEFAULT_MAX_VALUE_LEN;

lazy_static! {
    /// Identifies this process instance across restarts that reuse a pid.
    static ref PROCESS_INSTANCE_ID: String = Uuid::new_v4().to_string();
}

/// Produces the context attached to every log record.
pub trait ContextSnapshotProvider: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    fn snapshot(&self) -> ContextSnapshot;

    /// Like [`snapshot`](Self::snapshot), but reports a snapshot that could
    /// not be taken at all instead of substituting an empty one. Caches use
    /// this to keep serving their last good value.
    fn try_snapshot(&self) -> Result<ContextSnapshot> {
        Ok(self.snapshot())
    }
}

impl<P: ContextSnapshotProvider + ?Sized> ContextSnapshotProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn snapshot(&self) -> ContextSnapshot {
        (**self).snapshot()
    }

    fn try_snapshot(&self) -> Result<ContextSnapshot> {
        (**self).try_snapshot()
    }
}

/// Take a snapshot, turning a panicking provider into an error.
pub fn catch_try_snapshot(
    provider: &dyn ContextSnapshotProvider,
    ctx: &LogContext,
) -> Result<ContextSnapshot> {
    match catch_unwind(AssertUnwindSafe(|| provider.try_snapshot())) {
        Ok(result) => result,
        Err(_) => {
            log::warn!(
                "{} CONTEXT_PROVIDER_PANICKED provider={}",
                ctx,
                provider.name()
            );
            Err(EnrichError::ContextUnavailable {
                field: provider.name().to_string(),
            })
        }
    }
}

/// Take a snapshot, substituting an empty one when none could be taken.
pub fn catch_snapshot(provider: &dyn ContextSnapshotProvider, ctx: &LogContext) -> ContextSnapshot {
    catch_try_snapshot(provider, ctx).unwrap_or_else(|_| ContextSnapshot::empty())
}

/// Always returns the same snapshot.
#[derive(Debug, Clone)]
pub struct StaticContextProvider {
    name: String,
    snapshot: ContextSnapshot,
}

impl StaticContextProvider {
    pub fn new(name: &str, snapshot: ContextSnapshot) -> Self {
        Self {
            name: name.to_string(),
            snapshot,
        }
    }

    pub fn empty() -> Self {
        Self::new("empty", ContextSnapshot::empty())
    }
}

impl ContextSnapshotProvider for StaticContextProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> ContextSnapshot {
        self.snapshot.clone()
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads context fields from environment variables.
///
/// Each mapping is `ENV_VAR -> property_key`. Unset or empty variables are
/// unknown fields.
pub struct EnvContextProvider {
    mappings: BTreeMap<String, String>,
    policy: MissingFieldPolicy,
    max_value_len: usize,
    lookup: Lookup,
    ctx: LogContext,
}

impl EnvContextProvider {
    pub fn new(mappings: BTreeMap<String, String>) -> Self {
        Self {
            mappings,
            policy: MissingFieldPolicy::default(),
            max_value_len: DEFAULT_MAX_VALUE_LEN,
            lookup: Box::new(|var| std::env::var(var).ok()),
            ctx: LogContext::new("default").with_source("env-context"),
        }
    }

    pub fn with_policy(mut self, policy: MissingFieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_value_len(mut self, max_value_len: usize) -> Self {
        self.max_value_len = max_value_len;
        self
    }

    pub fn with_log_context(mut self, ctx: LogContext) -> Self {
        self.ctx = ctx.with_source("env-context");
        self
    }

    /// Replace the environment lookup (host runtimes that keep their
    /// properties somewhere other than the process environment).
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Box::new(lookup);
        self
    }

    pub fn mappings(&self) -> &BTreeMap<String, String> {
        &self.mappings
    }
}

impl std::fmt::Debug for EnvContextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvContextProvider")
            .field("mappings", &self.mappings)
            .field("policy", &self.policy)
            .field("max_value_len", &self.max_value_len)
            .finish()
    }
}

impl ContextSnapshotProvider for EnvContextProvider {
    fn name(&self) -> &str {
        "env-context"
    }

    fn snapshot(&self) -> ContextSnapshot {
        let mut builder = SnapshotBuilder::new(self.policy, self.max_value_len);
        for (var, key) in &self.mappings {
            let value = (self.lookup)(var).filter(|v| !v.is_empty());
            builder.field(key, value);
        }
        builder.build(&self.ctx)
    }
}

/// Context every process can report: pid, a per-process instance id and
/// the host name when it can be determined.
///
/// Everything is computed once at construction; `snapshot` does no I/O.
#[derive(Debug, Clone)]
pub struct ProcessContextProvider {
    snapshot: ContextSnapshot,
}

impl ProcessContextProvider {
    pub fn new(policy: MissingFieldPolicy) -> Self {
        let ctx = LogContext::new("default").with_source("process-context");
        let mut builder = SnapshotBuilder::new(policy, DEFAULT_MAX_VALUE_LEN);
        builder
            .field("process_id", Some(std::process::id().to_string()))
            .field("process_instance_id", Some(PROCESS_INSTANCE_ID.clone()))
            .field("host_name", detect_host_name());
        Self {
            snapshot: builder.build(&ctx),
        }
    }
}

impl Default for ProcessContextProvider {
    fn default() -> Self {
        Self::new(MissingFieldPolicy::default())
    }
}

impl ContextSnapshotProvider for ProcessContextProvider {
    fn name(&self) -> &str {
        "process-context"
    }

    fn snapshot(&self) -> ContextSnapshot {
        self.snapshot.clone()
    }
}

fn detect_host_name() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .chain(std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
}

/// Merges several providers; later providers win on a shared key.
pub struct CompositeContextProvider {
    name: String,
    providers: Vec<Arc<dyn ContextSnapshotProvider>>,
    ctx: LogContext,
}

impl CompositeContextProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            providers: Vec::new(),
            ctx: LogContext::new("default").with_source(name),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ContextSnapshotProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ContextSnapshotProvider for CompositeContextProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> ContextSnapshot {
        self.providers
            .iter()
            .map(|p| catch_snapshot(p.as_ref(), &self.ctx))
            .fold(ContextSnapshot::empty(), |acc, next| acc.merged(&next))
    }
}

/// Adapts a closure, typically a call into a host runtime's introspection
/// API that returns whatever it currently knows.
pub struct FnContextProvider<F> {
    name: String,
    max_value_len: usize,
    fetch: F,
    ctx: LogContext,
}

impl<F> FnContextProvider<F>
where
    F: Fn() -> BTreeMap<String, String> + Send + Sync,
{
    pub fn new(name: &str, fetch: F) -> Self {
        Self {
            name: name.to_string(),
            max_value_len: DEFAULT_MAX_VALUE_LEN,
            fetch,
            ctx: LogContext::new("default").with_source(name),
        }
    }

    pub fn with_max_value_len(mut self, max_value_len: usize) -> Self {
        self.max_value_len = max_value_len;
        self
    }
}

impl<F> ContextSnapshotProvider for FnContextProvider<F>
where
    F: Fn() -> BTreeMap<String, String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> ContextSnapshot {
        let (entries, _) = crate::security::sanitizer::sanitize_properties(
            (self.fetch)(),
            self.max_value_len,
            &self.ctx,
        );
        ContextSnapshot::from(entries)
    }
}
