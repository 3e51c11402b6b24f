//! FIFO of idle buffer records owned by the pool worker

use std::collections::VecDeque;

use crate::record::BufferRecord;

/// Outcome of one eviction sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Sweep {
    pub(crate) evicted: usize,
    pub(crate) freed_bytes: u64,
}

/// Idle records in insertion order.
///
/// Records are only ever appended at the tail with the current clock
/// reading, so `last_used` is non-decreasing from head to tail and an
/// expiry scan can stop at the first fresh record.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    records: VecDeque<BufferRecord>,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub(crate) fn push_back(&mut self, record: BufferRecord) {
        debug_assert!(
            self.records.back().is_none_or(|tail| tail.last_used <= record.last_used),
            "pending queue timestamps must be non-decreasing"
        );
        self.records.push_back(record);
    }

    /// Put a record back at the head after a handoff that did not complete
    #[inline]
    pub(crate) fn push_front(&mut self, record: BufferRecord) {
        self.records.push_front(record);
    }

    #[inline]
    pub(crate) fn pop_front(&mut self) -> Option<BufferRecord> {
        self.records.pop_front()
    }

    #[cfg(test)]
    pub(crate) fn front(&self) -> Option<&BufferRecord> {
        self.records.front()
    }

    /// Drop expired records from the head, stopping at the first fresh one
    pub(crate) fn evict_expired(&mut self, now: u64, idle_threshold: u64) -> Sweep {
        let mut sweep = Sweep::default();
        while let Some(head) = self.records.front()
            && head.is_expired(now, idle_threshold)
        {
            sweep.freed_bytes += head.len() as u64;
            sweep.evicted += 1;
            self.records.pop_front();
        }
        sweep
    }
}
