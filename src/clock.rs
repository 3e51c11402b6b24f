//! Time source used to stamp buffer records

use std::fmt;
use std::time::Instant;

/// Second-resolution clock consulted by the pool worker.
///
/// Readings must never go backwards: the pending queue relies on
/// non-decreasing timestamps to stop its eviction scan early.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current reading in whole seconds
    fn now_secs(&self) -> u64;
}

/// Monotonic clock counting seconds since its creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at zero
    #[inline]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_secs(&self) -> u64 {
        self.origin.elapsed().as_secs()
    }
}

/// Hand-driven clock for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    secs: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.secs.load(std::sync::atomic::Ordering::SeqCst)
    }
}
