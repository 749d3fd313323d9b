//! Time-bounded context snapshots.
//!
//! Host-runtime introspection can stall (a session still starting, a
//! blocked metadata endpoint). Snapshots run on a [`BoundedPool`] so a
//! stalled source pins a worker thread instead of the logging thread.

use std::sync::Arc;
use std::time::Duration;

use crate::context::provider::{catch_snapshot, ContextSnapshotProvider};
use crate::context::snapshot::ContextSnapshot;
use crate::error::{EnrichError, Result};
use crate::logging::structured::LogContext;
use crate::worker::{BoundedPool, CallError};

pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_SNAPSHOT_WORKERS: usize = 1;
pub const DEFAULT_SNAPSHOT_QUEUE: usize = 16;

/// Wraps a provider so that every snapshot returns within `budget`.
///
/// `snapshot` answers with an empty snapshot when the budget runs out;
/// `try_snapshot` reports the timeout so a cache in front can keep its
/// last good value.
pub struct TimeoutContextProvider {
    name: String,
    budget: Duration,
    pool: BoundedPool<ContextSnapshot>,
    ctx: LogContext,
}

impl TimeoutContextProvider {
    pub fn new(inner: Arc<dyn ContextSnapshotProvider>, budget: Duration) -> Result<Self> {
        Self::with_pool(
            inner,
            budget,
            DEFAULT_SNAPSHOT_WORKERS,
            DEFAULT_SNAPSHOT_QUEUE,
            &LogContext::new("default"),
        )
    }

    pub fn with_pool(
        inner: Arc<dyn ContextSnapshotProvider>,
        budget: Duration,
        workers: usize,
        queue: usize,
        ctx: &LogContext,
    ) -> Result<Self> {
        let name = inner.name().to_string();
        let ctx = ctx.with_source(&name);
        let worker_ctx = ctx.clone();
        let pool = BoundedPool::spawn(&format!("context-{}", name), workers, queue, move || {
            catch_snapshot(inner.as_ref(), &worker_ctx)
        })?;

        log::debug!(
            "{} SNAPSHOT_POOL_STARTED workers={} queue={} budget_ms={}",
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
}

impl ContextSnapshotProvider for TimeoutContextProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> ContextSnapshot {
        self.try_snapshot().unwrap_or_else(|_| ContextSnapshot::empty())
    }

    fn try_snapshot(&self) -> Result<ContextSnapshot> {
        match self.pool.call(self.budget) {
            Ok(snapshot) => Ok(snapshot),
            Err(CallError::Timeout) => {
                log::debug!(
                    "{} SNAPSHOT_TIMEOUT budget_ms={}",
                    self.ctx,
                    self.budget.as_millis()
                );
                Err(EnrichError::Timeout(self.budget))
            }
            Err(err) => {
                log::debug!("{} SNAPSHOT_UNAVAILABLE reason={}", self.ctx, err);
                Err(EnrichError::ContextUnavailable {
                    field: self.name.clone(),
                })
            }
        }
    }
}
