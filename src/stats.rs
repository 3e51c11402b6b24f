//! Worker-maintained counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters written only by the worker thread and read by anyone.
///
/// Updates land before the handoff they describe completes, so a caller
/// that has just received a buffer sees counters covering that take.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    allocated: AtomicU64,
    taken: AtomicU64,
    returned: AtomicU64,
    evicted: AtomicU64,
    os_releases: AtomicU64,
    pending: AtomicUsize,
    pending_freed_bytes: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn record_allocation(&self) {
        self.allocated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_take(&self) {
        self.taken.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_return(&self) {
        self.returned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_eviction(&self, evicted: usize, pending_freed_bytes: u64) {
        self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        self.pending_freed_bytes.store(pending_freed_bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_os_release(&self) {
        self.os_releases.fetch_add(1, Ordering::Relaxed);
        self.pending_freed_bytes.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_pending(&self, pending: usize) {
        self.pending.store(pending, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            os_releases: self.os_releases.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            pending_freed_bytes: self.pending_freed_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Records synthesized because the queue was empty
    pub allocated: u64,
    /// Buffers handed out through the take conduit
    pub taken: u64,
    /// Buffers accepted through the return conduit
    pub returned: u64,
    /// Records dropped by eviction sweeps
    pub evicted: u64,
    /// Times the OS release primitive ran
    pub os_releases: u64,
    /// Records currently idle in the queue
    pub pending: usize,
    /// Evicted bytes not yet covered by an OS release
    pub pending_freed_bytes: u64,
}

impl PoolStats {
    /// Fraction of takes served without a fresh allocation (0.0 to 1.0)
    pub fn reuse_rate(&self) -> f64 {
        if self.taken == 0 {
            return 0.0;
        }
        let fresh = self.allocated.min(self.taken);
        (self.taken - fresh) as f64 / self.taken as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let counters = Counters::default();
        counters.record_allocation();
        counters.record_take();
        counters.record_return();
        counters.record_eviction(3, 12_288);
        counters.set_pending(4);

        let stats = counters.snapshot();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.taken, 1);
        assert_eq!(stats.returned, 1);
        assert_eq!(stats.evicted, 3);
        assert_eq!(stats.pending, 4);
        assert_eq!(stats.pending_freed_bytes, 12_288);

        counters.record_os_release();
        let stats = counters.snapshot();
        assert_eq!(stats.os_releases, 1);
        assert_eq!(stats.pending_freed_bytes, 0);
    }

    #[test]
    fn test_reuse_rate() {
        assert_eq!(PoolStats::default().reuse_rate(), 0.0);

        let stats = PoolStats { allocated: 1, taken: 4, ..PoolStats::default() };
        assert!((stats.reuse_rate() - 0.75).abs() < f64::EPSILON);

        // Pre-warmed allocations beyond the number of takes count as zero reuse
        let stats = PoolStats { allocated: 10, taken: 2, ..PoolStats::default() };
        assert_eq!(stats.reuse_rate(), 0.0);
    }
}
