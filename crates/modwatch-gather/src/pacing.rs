//! Request pacing shared across workers.
//!
//! Every worker draws on one upstream quota, so each pause lasts the base
//! interval multiplied by the number of workers still running.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::ShutdownSignal;

/// Live count of running workers.
#[derive(Debug, Clone, Default)]
pub struct ActiveWorkers {
    count: Arc<AtomicUsize>,
}

impl ActiveWorkers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker; the count drops again when the guard is dropped.
    #[must_use]
    pub fn enter(&self) -> ActiveGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            count: Arc::clone(&self.count),
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ActiveGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sleeps `interval × max(1, active workers)` between upstream calls.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    active: ActiveWorkers,
}

impl Pacer {
    #[must_use]
    pub fn new(interval: Duration, active: ActiveWorkers) -> Self {
        Self { interval, active }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        let workers = u32::try_from(self.active.count().max(1)).unwrap_or(u32::MAX);
        self.interval.saturating_mul(workers)
    }

    /// Returns `false` if the pause was interrupted by shutdown.
    pub async fn pause(&self, shutdown: &ShutdownSignal) -> bool {
        shutdown.sleep(self.delay()).await
    }
}
