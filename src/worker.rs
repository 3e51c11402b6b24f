//! The actor that owns every idle buffer.
//!
//! One thread runs [`PoolWorker::run`]. Each iteration it makes sure a
//! record is at the head of the pending queue, offers that record on the
//! take conduit, and then completes exactly one of three operations:
//!
//! ```text
//!            take conduit (rendezvous)
//!   head ──────────────────────────────▶ caller
//!
//!            return conduit (rendezvous)
//!   tail ◀────────────────────────────── caller
//!
//!            evict conduit (rendezvous)
//!   sweep ◀───────────────────────────── timer / trigger_eviction()
//! ```
//!
//! Nothing else reads or writes the queue, so it needs no lock.

use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Select, Sender};

use crate::pool::Shared;
use crate::queue::{PendingQueue, Sweep};
use crate::record::BufferRecord;

/// Message asking the worker to run an eviction sweep
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvictTrigger;

/// Worker-side ends of the three conduits
#[derive(Debug)]
pub(crate) struct WorkerConduits {
    pub(crate) take_tx: Sender<Vec<u8>>,
    pub(crate) return_rx: Receiver<Vec<u8>>,
    pub(crate) evict_rx: Receiver<EvictTrigger>,
}

#[derive(Debug)]
pub(crate) struct PoolWorker {
    queue: PendingQueue,
    /// Evicted bytes since the last OS release
    freed: u64,
    shared: Arc<Shared>,
}

impl PoolWorker {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            queue: PendingQueue::new(),
            freed: 0,
            shared,
        }
    }

    /// Start the worker on its own named thread
    pub(crate) fn spawn(self, conduits: WorkerConduits) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tidepool-worker".into())
            .spawn(move || self.run(conduits))
    }

    /// Serve take, return and evict messages until every handle is gone
    pub(crate) fn run(mut self, conduits: WorkerConduits) {
        let mut sel = Select::new();
        let take_op = sel.send(&conduits.take_tx);
        let return_op = sel.recv(&conduits.return_rx);
        let evict_op = sel.recv(&conduits.evict_rx);

        loop {
            let head = self.offer();
            let oper = sel.select();
            let index = oper.index();

            if index == take_op {
                let last_used = head.last_used;
                self.shared.counters.record_take();
                self.shared.counters.set_pending(self.queue.len());
                // Callers get unpinned buffers: a buffer they never give back
                // must not be freed while still locked.
                if let Err(err) = oper.send(&conduits.take_tx, head.into_data()) {
                    self.queue.push_front(BufferRecord::returned(err.into_inner(), last_used));
                    break;
                }
            } else if index == return_op {
                self.queue.push_front(head);
                match oper.recv(&conduits.return_rx) {
                    Ok(data) => self.accept_return(data),
                    Err(_) => break,
                }
            } else {
                debug_assert_eq!(index, evict_op);
                self.queue.push_front(head);
                match oper.recv(&conduits.evict_rx) {
                    Ok(EvictTrigger) => {
                        self.sweep();
                    }
                    Err(_) => break,
                }
            }
        }

        self.shutdown();
    }

    /// Detach the head record for offering, synthesizing one if the queue is empty
    fn offer(&mut self) -> BufferRecord {
        match self.queue.pop_front() {
            Some(record) => record,
            None => self.synthesize(),
        }
    }

    fn synthesize(&self) -> BufferRecord {
        let block_size = self.shared.block_size.load(Ordering::Relaxed);
        let mut record = BufferRecord::zeroed(block_size, self.shared.config.clock.now_secs());
        if self.shared.config.pinned_memory {
            record.pin();
        }
        self.shared.counters.record_allocation();
        tracing::trace!(block_size, "synthesized buffer record");
        record
    }

    fn accept_return(&mut self, data: Vec<u8>) {
        let now = self.shared.config.clock.now_secs();
        let mut record = BufferRecord::returned(data, now);
        if self.shared.config.pinned_memory {
            record.pin();
        }
        self.queue.push_back(record);
        self.shared.counters.record_return();
        self.shared.counters.set_pending(self.queue.len());
    }

    /// Evict idle records and release memory to the OS once enough has piled up
    fn sweep(&mut self) -> Sweep {
        let config = &self.shared.config;
        let now = config.clock.now_secs();
        let sweep = self.queue.evict_expired(now, config.idle_threshold_secs);
        self.freed += sweep.freed_bytes;

        self.shared.counters.record_eviction(sweep.evicted, self.freed);
        self.shared.counters.set_pending(self.queue.len());
        tracing::debug!(
            evicted = sweep.evicted,
            freed_bytes = sweep.freed_bytes,
            pending = self.queue.len(),
            "eviction sweep"
        );

        if self.freed > config.os_reclaim_threshold {
            tracing::info!(freed_bytes = self.freed, "releasing idle buffer memory to the OS");
            config.reclaimer.release_unused();
            self.freed = 0;
            self.shared.counters.record_os_release();
        }
        sweep
    }

    fn shutdown(mut self) {
        let pending = self.queue.len();
        while self.queue.pop_front().is_some() {}
        self.shared.counters.set_pending(0);
        self.shared.config.reclaimer.release_unused();
        tracing::debug!(pending, "buffer pool worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Builder;
    use crate::os::{CountingReclaimer, MLOCK_TESTS};

    fn worker(
        block_size: usize,
        reclaim_threshold: u64,
    ) -> (PoolWorker, Arc<ManualClock>, Arc<CountingReclaimer>) {
        let clock = Arc::new(ManualClock::default());
        let reclaimer = Arc::new(CountingReclaimer::default());
        let config = Builder::default()
            .block_size(block_size)
            .os_reclaim_threshold(reclaim_threshold)
            .clock(clock.clone())
            .reclaimer(reclaimer.clone())
            .into_config()
            .unwrap();
        (PoolWorker::new(Arc::new(Shared::new(config))), clock, reclaimer)
    }

    #[test]
    fn test_offer_synthesizes_on_empty_queue() {
        let (mut worker, _, _) = worker(4096, u64::MAX);
        let head = worker.offer();
        assert_eq!(head.len(), 4096);
        assert!(head.data.iter().all(|&b| b == 0));
        assert_eq!(worker.shared.counters.snapshot().allocated, 1);
    }

    #[test]
    fn test_offer_prefers_queued_record() {
        let (mut worker, _, _) = worker(4096, u64::MAX);
        worker.accept_return(vec![7u8; 4096]);
        let head = worker.offer();
        assert_eq!(head.data[0], 7);
        assert_eq!(worker.shared.counters.snapshot().allocated, 0);
    }

    #[test]
    fn test_synthesis_follows_block_size_changes() {
        let (mut worker, _, _) = worker(4096, u64::MAX);
        worker.shared.block_size.store(512, Ordering::Relaxed);
        assert_eq!(worker.offer().len(), 512);
    }

    #[test]
    fn test_sweep_only_removes_expired_head_run() {
        let (mut worker, clock, _) = worker(100, u64::MAX);
        worker.accept_return(vec![0; 100]);
        clock.advance(20);
        worker.accept_return(vec![0; 100]);
        clock.advance(15);

        // First record is 35s idle, second 15s
        let sweep = worker.sweep();
        assert_eq!(sweep, Sweep { evicted: 1, freed_bytes: 100 });
        assert_eq!(worker.queue.len(), 1);
    }

    #[test]
    fn test_sweep_counts_actual_record_sizes() {
        let (mut worker, clock, _) = worker(100, u64::MAX);
        worker.accept_return(vec![0; 100]);
        worker.accept_return(vec![0; 250]);
        clock.advance(31);
        assert_eq!(worker.sweep().freed_bytes, 350);
        assert_eq!(worker.freed, 350);
    }

    #[test]
    fn test_os_release_hysteresis() {
        let (mut worker, clock, reclaimer) = worker(4096, 10_000);

        // 8192 bytes freed: below the threshold, nothing released yet
        worker.accept_return(vec![0; 4096]);
        worker.accept_return(vec![0; 4096]);
        clock.advance(31);
        worker.sweep();
        assert_eq!(reclaimer.calls(), 0);
        assert_eq!(worker.freed, 8192);

        // Another 8192 carries the running total over the threshold
        worker.accept_return(vec![0; 4096]);
        worker.accept_return(vec![0; 4096]);
        clock.advance(31);
        worker.sweep();
        assert_eq!(reclaimer.calls(), 1);
        assert_eq!(worker.freed, 0);

        let stats = worker.shared.counters.snapshot();
        assert_eq!(stats.os_releases, 1);
        assert_eq!(stats.pending_freed_bytes, 0);
        assert_eq!(stats.evicted, 4);
    }

    #[test]
    fn test_threshold_must_be_exceeded() {
        let (mut worker, clock, reclaimer) = worker(4096, 8192);
        worker.accept_return(vec![0; 4096]);
        worker.accept_return(vec![0; 4096]);
        clock.advance(31);
        worker.sweep();
        assert_eq!(reclaimer.calls(), 0);
    }

    #[test]
    fn test_evicted_records_are_unpinned() {
        let _serial = MLOCK_TESTS.lock();
        let clock = Arc::new(ManualClock::default());
        let config = Builder::default()
            .block_size(64 * 1024)
            .pinned_memory(true)
            .clock(clock.clone())
            .reclaimer(Arc::new(CountingReclaimer::default()))
            .into_config()
            .unwrap();
        let mut worker = PoolWorker::new(Arc::new(Shared::new(config)));

        #[cfg(target_os = "linux")]
        let baseline = crate::os::locked_kib();

        let head = worker.offer();
        worker.queue.push_front(head);
        for _ in 0..8 {
            worker.accept_return(vec![0u8; 64 * 1024]);
        }

        clock.advance(31);
        assert_eq!(worker.sweep().evicted, 9);

        #[cfg(target_os = "linux")]
        if let Some(before) = baseline {
            assert_eq!(crate::os::locked_kib(), Some(before));
        }
    }

    #[test]
    fn test_handed_out_buffer_is_unpinned() {
        let _serial = MLOCK_TESTS.lock();
        let config = Builder::default()
            .block_size(64 * 1024)
            .pinned_memory(true)
            .into_config()
            .unwrap();
        let mut worker = PoolWorker::new(Arc::new(Shared::new(config)));

        #[cfg(target_os = "linux")]
        let baseline = crate::os::locked_kib();

        let data = worker.offer().into_data();
        assert_eq!(data.len(), 64 * 1024);

        #[cfg(target_os = "linux")]
        if let Some(before) = baseline {
            assert_eq!(crate::os::locked_kib(), Some(before));
        }
    }

    #[test]
    fn test_shutdown_releases_memory() {
        let (mut worker, _, reclaimer) = worker(64, u64::MAX);
        worker.accept_return(vec![0; 64]);
        worker.shutdown();
        assert_eq!(reclaimer.calls(), 1);
    }
}
