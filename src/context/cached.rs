//! TTL cache in front of a context provider.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCell;
use crate::context::provider::{catch_try_snapshot, ContextSnapshotProvider};
use crate::context::snapshot::ContextSnapshot;
use crate::logging::structured::LogContext;

/// How soon a failed refresh is retried.
pub const DEFAULT_RETRY_TTL: Duration = Duration::from_secs(1);

/// Serves a cached snapshot for `ttl`, refreshing it from the inner
/// provider on one thread while the others keep the stale value.
///
/// A refresh that fails (timed out, panicked) keeps the previous snapshot
/// and is retried after `retry_ttl`. Put a
/// [`TimeoutContextProvider`](crate::context::timeout::TimeoutContextProvider)
/// underneath so the refreshing thread is bounded too.
///
/// Before the first refresh completes, concurrent callers get an empty
/// snapshot rather than waiting; use [`primed`](Self::primed) to avoid that
/// window at start-up.
pub struct CachedContextProvider {
    inner: Arc<dyn ContextSnapshotProvider>,
    ttl: Duration,
    retry_ttl: Duration,
    cell: TtlCell<ContextSnapshot>,
    ctx: LogContext,
}

impl CachedContextProvider {
    pub fn new(inner: Arc<dyn ContextSnapshotProvider>, ttl: Duration) -> Self {
        let ctx = LogContext::new("default").with_source(inner.name());
        Self {
            inner,
            ttl,
            retry_ttl: DEFAULT_RETRY_TTL.min(ttl),
            cell: TtlCell::new(),
            ctx,
        }
    }

    pub fn with_retry_ttl(mut self, retry_ttl: Duration) -> Self {
        self.retry_ttl = retry_ttl;
        self
    }

    pub fn with_log_context(mut self, ctx: &LogContext) -> Self {
        self.ctx = ctx.with_source(self.inner.name());
        self
    }

    /// Fill the cache now so concurrent first callers never see the
    /// empty fallback.
    pub fn primed(self) -> Self {
        self.snapshot();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn needs_refresh(&self) -> bool {
        self.cell.needs_refresh()
    }

    /// Drop the cached snapshot so the next call refreshes.
    pub fn invalidate(&self) {
        self.cell.invalidate();
    }

    fn refresh(&self) -> (ContextSnapshot, Duration) {
        let previous_age = self.cell.cache_age_secs();
        match catch_try_snapshot(self.inner.as_ref(), &self.ctx) {
            Ok(snapshot) => {
                log::debug!(
                    "{} SNAPSHOT_REFRESHED keys={} ttl_ms={} previous_age_secs={:?}",
                    self.ctx,
                    snapshot.len(),
                    self.ttl.as_millis(),
                    previous_age
                );
                (snapshot, self.ttl)
            }
            Err(e) => {
                log::info!(
                    "{} SNAPSHOT_REFRESH_FAILED error={} stale_age_secs={:?} retry_in_ms={}",
                    self.ctx,
                    e,
                    previous_age,
                    self.retry_ttl.as_millis()
                );
                let stale = self.cell.get_any().unwrap_or_else(ContextSnapshot::empty);
                (stale, self.retry_ttl)
            }
        }
    }
}

impl ContextSnapshotProvider for CachedContextProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn snapshot(&self) -> ContextSnapshot {
        self.cell
            .get_or_refresh(|| self.refresh(), ContextSnapshot::empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::provider::FnContextProvider;
    use crate::context::timeout::TimeoutContextProvider;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl ContextSnapshotProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn snapshot(&self) -> ContextSnapshot {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            [("refresh_count", n.to_string())].into_iter().collect()
        }
    }

    #[test]
    fn test_snapshot_cached_within_ttl() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedContextProvider::new(inner.clone(), Duration::from_secs(60));

        assert_eq!(cached.snapshot().get("refresh_count"), Some("1"));
        assert_eq!(cached.snapshot().get("refresh_count"), Some("1"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert!(!cached.needs_refresh());
    }

    #[test]
    fn test_snapshot_refreshed_after_ttl() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedContextProvider::new(inner.clone(), Duration::ZERO);

        cached.snapshot();
        cached.snapshot();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_primed_fetches_once_up_front() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedContextProvider::new(inner.clone(), Duration::from_secs(60)).primed();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.snapshot().get("refresh_count"), Some("1"));
    }

    #[test]
    fn test_invalidate_forces_refresh() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedContextProvider::new(inner.clone(), Duration::from_secs(60));

        cached.snapshot();
        cached.invalidate();
        assert_eq!(cached.snapshot().get("refresh_count"), Some("2"));
    }

    #[test]
    fn test_stalled_refresh_serves_stale_within_budget() {
        let stall = Arc::new(AtomicBool::new(false));
        let inner: Arc<dyn ContextSnapshotProvider> = {
            let stall = Arc::clone(&stall);
            Arc::new(FnContextProvider::new("runtime", move || {
                if stall.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_secs(3));
                }
                [("cluster_id".to_string(), "c-1".to_string())]
                    .into_iter()
                    .collect::<BTreeMap<_, _>>()
            }))
        };
        let budget = Duration::from_millis(50);
        let bounded = Arc::new(TimeoutContextProvider::new(inner, budget).unwrap());
        let cached = CachedContextProvider::new(bounded, Duration::from_millis(1))
            .with_retry_ttl(Duration::from_secs(60))
            .primed();

        stall.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));

        let started = Instant::now();
        let snapshot = cached.snapshot();
        assert!(started.elapsed() < budget + Duration::from_millis(500));
        assert_eq!(snapshot.get("cluster_id"), Some("c-1"));

        // The failed refresh is not retried on every call.
        let started = Instant::now();
        assert_eq!(cached.snapshot().get("cluster_id"), Some("c-1"));
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn test_panicking_refresh_keeps_previous_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner: Arc<dyn ContextSnapshotProvider> = {
            let calls = Arc::clone(&calls);
            Arc::new(FnContextProvider::new("runtime", move || {
                if calls.fetch_add(1, Ordering::SeqCst) > 0 {
                    panic!("session lost");
                }
                [("session_id".to_string(), "s-1".to_string())]
                    .into_iter()
                    .collect::<BTreeMap<_, _>>()
            }))
        };
        let cached = CachedContextProvider::new(inner, Duration::ZERO);

        assert_eq!(cached.snapshot().get("session_id"), Some("s-1"));
        assert_eq!(cached.snapshot().get("session_id"), Some("s-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
