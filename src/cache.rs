//! TTL-bounded value cell shared by the cached providers and resolvers.
//!
//! Readers clone the current value under a short read lock. When the value
//! is stale, exactly one caller wins the refresh election (`try_lock`) and
//! performs the fetch while holding only the refresh mutex; every other
//! caller keeps being served the stale value without waiting.

use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

#[derive(Debug)]
struct Entry<T> {
    value: T,
    loaded_at: Instant,
    ttl: Duration,
}

impl<T> Entry<T> {
    fn is_expired(&self) -> bool {
        self.loaded_at.elapsed() >= self.ttl
    }
}

/// A single cached value with a per-entry TTL.
#[derive(Debug)]
pub struct TtlCell<T> {
    entry: RwLock<Option<Entry<T>>>,
    refresh: Mutex<()>,
}

impl<T> Default for TtlCell<T> {
    fn default() -> Self {
        Self {
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }
}

impl<T: Clone> TtlCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the cell needs refresh (empty or TTL expired).
    pub fn needs_refresh(&self) -> bool {
        match self.entry.read().as_ref() {
            Some(entry) => entry.is_expired(),
            None => true,
        }
    }

    /// Age of the cached value in seconds, reported in refresh diagnostics.
    pub fn cache_age_secs(&self) -> Option<u64> {
        self.entry
            .read()
            .as_ref()
            .map(|e| e.loaded_at.elapsed().as_secs())
    }

    /// The cached value if it has not expired.
    pub fn get_fresh(&self) -> Option<T> {
        self.entry
            .read()
            .as_ref()
            .filter(|e| !e.is_expired())
            .map(|e| e.value.clone())
    }

    /// The cached value, expired or not.
    pub fn get_any(&self) -> Option<T> {
        self.entry.read().as_ref().map(|e| e.value.clone())
    }

    /// Replace the cached value.
    pub fn store(&self, value: T, ttl: Duration) {
        *self.entry.write() = Some(Entry {
            value,
            loaded_at: Instant::now(),
            ttl,
        });
    }

    pub fn invalidate(&self) {
        *self.entry.write() = None;
    }

    /// Serve the cached value, refreshing it if stale.
    ///
    /// `fetch` returns the new value and how long it stays fresh. It runs
    /// on at most one thread at a time. Callers that lose the refresh
    /// election get the stale value, or `fallback()` when the cell has
    /// never been filled.
    pub fn get_or_refresh<F, D>(&self, fetch: F, fallback: D) -> T
    where
        F: FnOnce() -> (T, Duration),
        D: FnOnce() -> T,
    {
        if let Some(value) = self.get_fresh() {
            return value;
        }

        match self.refresh.try_lock() {
            Some(_refreshing) => {
                // Another refresher may have finished between the read and
                // winning the election.
                if let Some(value) = self.get_fresh() {
                    return value;
                }
                let (value, ttl) = fetch();
                self.store(value.clone(), ttl);
                value
            }
            None => self.get_any().unwrap_or_else(fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_empty_cell_needs_refresh() {
        let cell: TtlCell<u32> = TtlCell::new();
        assert!(cell.needs_refresh());
        assert_eq!(cell.cache_age_secs(), None);
        assert_eq!(cell.get_any(), None);
    }

    #[test]
    fn test_fresh_value_is_served_without_fetch() {
        let cell = TtlCell::new();
        cell.store(7u32, Duration::from_secs(60));
        let value = cell.get_or_refresh(|| panic!("must not fetch"), || 0);
        assert_eq!(value, 7);
        assert!(!cell.needs_refresh());
    }

    #[test]
    fn test_expired_value_is_refreshed() {
        let cell = TtlCell::new();
        cell.store(1u32, Duration::ZERO);
        assert!(cell.needs_refresh());
        let value = cell.get_or_refresh(|| (2, Duration::from_secs(60)), || 0);
        assert_eq!(value, 2);
        assert_eq!(cell.get_fresh(), Some(2));
    }

    #[test]
    fn test_invalidate_clears_value() {
        let cell = TtlCell::new();
        cell.store(1u32, Duration::from_secs(60));
        cell.invalidate();
        assert!(cell.needs_refresh());
    }

    #[test]
    fn test_stale_value_served_while_refresh_in_flight() {
        let cell = Arc::new(TtlCell::new());
        cell.store(1u32, Duration::ZERO);

        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let refresher = {
            let cell = Arc::clone(&cell);
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                cell.get_or_refresh(
                    || {
                        entered.wait();
                        release.wait();
                        (2, Duration::from_secs(60))
                    },
                    || 0,
                )
            })
        };

        entered.wait();
        // The refresher holds the election; this caller must not block.
        let served = cell.get_or_refresh(|| panic!("second fetch"), || 0);
        assert_eq!(served, 1);
        release.wait();

        assert_eq!(refresher.join().unwrap(), 2);
        assert_eq!(cell.get_fresh(), Some(2));
    }

    #[test]
    fn test_fallback_when_never_filled_and_refresh_in_flight() {
        let cell = Arc::new(TtlCell::<u32>::new());
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let refresher = {
            let cell = Arc::clone(&cell);
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                cell.get_or_refresh(
                    || {
                        entered.wait();
                        release.wait();
                        (5, Duration::from_secs(60))
                    },
                    || 0,
                )
            })
        };

        entered.wait();
        assert_eq!(cell.get_or_refresh(|| (9, Duration::ZERO), || 42), 42);
        release.wait();
        assert_eq!(refresher.join().unwrap(), 5);
    }

    #[test]
    fn test_single_fetch_under_contention() {
        let cell = Arc::new(TtlCell::new());
        let fetches = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let fetches = Arc::clone(&fetches);
                thread::spawn(move || {
                    for _ in 0..100 {
                        cell.get_or_refresh(
                            || {
                                fetches.fetch_add(1, Ordering::SeqCst);
                                (1u32, Duration::from_secs(60))
                            },
                            || 0,
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
