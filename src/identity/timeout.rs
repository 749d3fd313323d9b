//! Time-bounded identity resolution.
//!
//! The external identity source is outside our control, so the logging
//! thread never calls it directly. Lookups run on a [`BoundedPool`] and the
//! caller waits at most `budget` for the answer.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{EnrichError, Result};
use crate::identity::resolver::{catch_resolve, IdentityResolver};
use crate::identity::result::IdentityResult;
use crate::logging::structured::LogContext;
use crate::worker::{BoundedPool, CallError};

pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_millis(250);
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE: usize = 64;

/// Wraps a resolver so that `resolve` returns within its budget.
pub struct TimeoutResolver {
    name: String,
    budget: Duration,
    pool: BoundedPool<IdentityResult>,
    ctx: LogContext,
}

impl TimeoutResolver {
    pub fn new(inner: Arc<dyn IdentityResolver>, budget: Duration) -> Result<Self> {
        Self::with_pool(inner, budget, DEFAULT_WORKERS, DEFAULT_QUEUE, &LogContext::new("default"))
    }

    /// Spawn `workers` threads sharing a queue of `queue` pending lookups.
    pub fn with_pool(
        inner: Arc<dyn IdentityResolver>,
        budget: Duration,
        workers: usize,
        queue: usize,
        ctx: &LogContext,
    ) -> Result<Self> {
        let name = inner.name().to_string();
        let ctx = ctx.with_source(&name);
        let worker_ctx = ctx.clone();
        let pool = BoundedPool::spawn(&format!("identity-{}", name), workers, queue, move || {
            catch_resolve(inner.as_ref(), &worker_ctx)
        })?;

        log::debug!(
            "{} IDENTITY_POOL_STARTED workers={} queue={} budget_ms={}",
            ctx,
            workers,
            queue,
            budget.as_millis()
        );

        Ok(Self {
            name,
            budget,
            pool,
            ctx,
        })
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }
}

impl IdentityResolver for TimeoutResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self) -> IdentityResult {
        match self.pool.call(self.budget) {
            Ok(result) => result,
            Err(CallError::Timeout) => {
                log::debug!(
                    "{} IDENTITY_TIMEOUT budget_ms={}",
                    self.ctx,
                    self.budget.as_millis()
                );
                EnrichError::Timeout(self.budget).into()
            }
            Err(CallError::Busy) => {
                log::debug!("{} IDENTITY_RESOLVER_BUSY", self.ctx);
                EnrichError::IdentityUnavailable("resolver busy".to_string()).into()
            }
            Err(CallError::Stopped) => {
                EnrichError::IdentityUnavailable("resolver stopped".to_string()).into()
            }
        }
    }
}
