//! Fixed pool of worker threads running one job per request, with the
//! caller waiting at most a given budget for the answer.
//!
//! A job that hangs pins one worker, never the caller. When every worker
//! is pinned and the queue is full, callers are turned away immediately.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{EnrichError, Result};
use crate::logging::structured::EnrichmentGuard;

/// Why a pooled call produced no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    /// All workers busy and the queue full.
    Busy,
    /// The pool has shut down.
    Stopped,
    /// The budget elapsed first.
    Timeout,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Busy => write!(f, "busy"),
            CallError::Stopped => write!(f, "stopped"),
            CallError::Timeout => write!(f, "timeout"),
        }
    }
}

type Reply<T> = SyncSender<T>;

pub struct BoundedPool<T> {
    jobs: SyncSender<Reply<T>>,
    workers: usize,
}

impl<T: Send + 'static> BoundedPool<T> {
    /// Spawn `workers` threads named `{thread_name}-{index}` sharing a queue
    /// of `queue` pending requests. Each request runs `job` once.
    pub fn spawn<F>(thread_name: &str, workers: usize, queue: usize, job: F) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(EnrichError::Config(format!(
                "{} needs at least one worker",
                thread_name
            )));
        }

        let job = Arc::new(job);
        let (jobs, receiver) = mpsc::sync_channel::<Reply<T>>(queue);
        let receiver = Arc::new(Mutex::new(receiver));

        for index in 0..workers {
            let job = Arc::clone(&job);
            let receiver = Arc::clone(&receiver);
            thread::Builder::new()
                .name(format!("{}-{}", thread_name, index))
                .spawn(move || worker_loop(job, receiver))?;
        }

        Ok(Self { jobs, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run the job on a worker and wait up to `budget` for its answer.
    pub fn call(&self, budget: Duration) -> std::result::Result<T, CallError> {
        let (reply, answer) = mpsc::sync_channel(1);

        match self.jobs.try_send(reply) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(CallError::Busy),
            Err(TrySendError::Disconnected(_)) => return Err(CallError::Stopped),
        }

        match answer.recv_timeout(budget) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(CallError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(CallError::Stopped),
        }
    }
}

/// Workers exit once the owning pool is dropped and the queue drains.
fn worker_loop<T, F>(job: Arc<F>, receiver: Arc<Mutex<Receiver<Reply<T>>>>)
where
    F: Fn() -> T,
{
    // Anything the job logs from this thread is forwarded unenriched.
    let _guard = EnrichmentGuard::enter();
    loop {
        let next = receiver.lock().recv();
        match next {
            Ok(reply) => {
                // The caller may have given up already.
                let _ = reply.send(job());
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_answer_within_budget() {
        let pool = BoundedPool::spawn("test-fast", 1, 4, || 42u32).unwrap();
        assert_eq!(pool.call(Duration::from_secs(1)), Ok(42));
        assert_eq!(pool.workers(), 1);
    }

    #[test]
    fn test_hung_job_returns_timeout_within_budget() {
        let pool = BoundedPool::spawn("test-hang", 1, 4, || {
            thread::sleep(Duration::from_secs(5));
            0u32
        })
        .unwrap();

        let budget = Duration::from_millis(30);
        let started = Instant::now();
        assert_eq!(pool.call(budget), Err(CallError::Timeout));
        assert!(started.elapsed() < budget + Duration::from_millis(500));
    }

    #[test]
    fn test_full_queue_is_busy() {
        let pool = BoundedPool::spawn("test-busy", 1, 1, || {
            thread::sleep(Duration::from_secs(5));
            0u32
        })
        .unwrap();

        // One request pins the worker, the next one fills the queue.
        assert_eq!(pool.call(Duration::from_millis(20)), Err(CallError::Timeout));
        assert_eq!(pool.call(Duration::from_millis(20)), Err(CallError::Timeout));
        assert_eq!(pool.call(Duration::from_millis(20)), Err(CallError::Busy));
    }

    #[test]
    fn test_jobs_run_under_enrichment_guard() {
        let pool = BoundedPool::spawn("test-guard", 1, 1, EnrichmentGuard::is_active).unwrap();
        assert_eq!(pool.call(Duration::from_secs(1)), Ok(true));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            BoundedPool::spawn("test-none", 0, 1, || 0u32),
            Err(EnrichError::Config(_))
        ));
    }
}
