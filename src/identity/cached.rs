//! TTL cache in front of an identity resolver.
//!
//! The current user rarely changes during a process lifetime, so the
//! external source only needs asking once per TTL. Failures are kept for a
//! shorter `failure_ttl` so a recovered source is picked up quickly without
//! retrying on every log call.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCell;
use crate::identity::resolver::{catch_resolve, IdentityResolver};
use crate::identity::result::IdentityResult;
use crate::logging::structured::LogContext;

pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(5);

/// Reason served to callers racing the very first lookup.
pub const REFRESH_IN_PROGRESS: &str = "refresh in progress";

pub struct CachedIdentityResolver {
    inner: Arc<dyn IdentityResolver>,
    ttl: Duration,
    failure_ttl: Duration,
    cell: TtlCell<IdentityResult>,
    ctx: LogContext,
}

impl CachedIdentityResolver {
    pub fn new(inner: Arc<dyn IdentityResolver>, ttl: Duration) -> Self {
        let ctx = LogContext::new("default").with_source(inner.name());
        Self {
            inner,
            ttl,
            failure_ttl: DEFAULT_FAILURE_TTL.min(ttl),
            cell: TtlCell::new(),
            ctx,
        }
    }

    pub fn with_failure_ttl(mut self, failure_ttl: Duration) -> Self {
        self.failure_ttl = failure_ttl;
        self
    }

    pub fn with_log_context(mut self, ctx: &LogContext) -> Self {
        self.ctx = ctx.with_source(self.inner.name());
        self
    }

    pub fn needs_refresh(&self) -> bool {
        self.cell.needs_refresh()
    }

    pub fn invalidate(&self) {
        self.cell.invalidate();
    }
}

impl IdentityResolver for CachedIdentityResolver {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn resolve(&self) -> IdentityResult {
        self.cell.get_or_refresh(
            || {
                let result = catch_resolve(self.inner.as_ref(), &self.ctx);
                let ttl = if result.is_resolved() {
                    self.ttl
                } else {
                    log::info!(
                        "{} IDENTITY_UNAVAILABLE reason={:?} retry_in_ms={} previous_age_secs={:?}",
                        self.ctx,
                        result.reason().unwrap_or_default(),
                        self.failure_ttl.as_millis(),
                        self.cell.cache_age_secs()
                    );
                    self.failure_ttl
                };
                (result, ttl)
            },
            || IdentityResult::unavailable(REFRESH_IN_PROGRESS),
        )
    }
}
