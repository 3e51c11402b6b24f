use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use crate::buffer::PooledBuffer;
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::stats::{Counters, PoolStats};
use crate::timer::EvictionTimer;
use crate::worker::{EvictTrigger, PoolWorker, WorkerConduits};

/// State shared between the handles and the worker.
///
/// The pending queue is deliberately not here: only the worker owns it.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) block_size: AtomicUsize,
    pub(crate) counters: Counters,
    pub(crate) config: PoolConfig,
}

impl Shared {
    pub(crate) fn new(config: PoolConfig) -> Self {
        Self {
            block_size: AtomicUsize::new(config.block_size),
            counters: Counters::default(),
            config,
        }
    }
}

/// Handle to a pool of fixed-size byte buffers served by a single worker thread
///
/// # Architecture
///
/// ```text
/// Caller 1        Caller 2        Caller N          Eviction timer
///    │ ▲             │ ▲             │ ▲                  │
///    │ │take         │ │             │ │                  │ every 60s
///    │ │             │ │             │ │                  │
///    ▼ │ return      ▼ │             ▼ │                  ▼
/// ┌──────────────────────────────────────────────────────────┐
/// │  Pool worker (one thread, one message per iteration)      │
/// │                                                           │
/// │  head ▶ [rec][rec][rec][rec] ◀ tail    oldest ─▶ newest   │
/// └──────────────────────────────────────────────────────────┘
/// ```
///
/// All three conduits are zero-capacity channels: a take completes only when
/// the worker hands over its head buffer, and a return completes only when the
/// worker has accepted the buffer. A slow worker therefore throttles callers.
///
/// # Thread Safety
///
/// `BufferPool` is `Clone`; every clone talks to the same worker. The worker
/// of a pool built with [`BufferPool::builder`] stops once every clone, and
/// every [`PooledBuffer`] taken from it, has been dropped.
#[derive(Clone, Debug)]
pub struct BufferPool {
    take_rx: Receiver<Vec<u8>>,
    return_tx: Sender<Vec<u8>>,
    evict_tx: Sender<EvictTrigger>,
    shared: Arc<Shared>,
}

impl BufferPool {
    /// Create a new private pool with default settings
    ///
    /// # Example
    /// ```
    /// use tidepool::BufferPool;
    ///
    /// let pool = BufferPool::new();
    /// let buffer = pool.take();
    /// assert_eq!(buffer.len(), 4096);
    /// pool.give_back(buffer);
    /// ```
    #[inline]
    pub fn new() -> Self {
        crate::Builder::default().build()
    }

    /// Create a builder for custom configuration
    #[inline]
    pub fn builder() -> crate::Builder {
        crate::Builder::default()
    }

    /// Start the worker (and timer, if enabled) for `config`
    pub(crate) fn with_config(config: PoolConfig) -> Result<Self> {
        let (take_tx, take_rx) = bounded(0);
        let (return_tx, return_rx) = bounded(0);
        let (evict_tx, evict_rx) = bounded(0);

        let interval = config.eviction_interval;
        let shared = Arc::new(Shared::new(config));

        PoolWorker::new(Arc::clone(&shared)).spawn(WorkerConduits {
            take_tx,
            return_rx,
            evict_rx,
        })?;

        if let Some(interval) = interval {
            EvictionTimer::new(interval, evict_tx.clone()).spawn()?;
        }

        Ok(Self {
            take_rx,
            return_tx,
            evict_tx,
            shared,
        })
    }

    /// The conduit buffers are taken from
    ///
    /// Every `recv` on it completes one handoff from the worker. The receiver
    /// may be cloned and kept for as long as the pool lives.
    #[inline]
    pub fn take_source(&self) -> &Receiver<Vec<u8>> {
        &self.take_rx
    }

    /// The conduit buffers are given back through
    ///
    /// Every `send` on it completes once the worker has queued the buffer.
    #[inline]
    pub fn return_sink(&self) -> &Sender<Vec<u8>> {
        &self.return_tx
    }

    /// Change the size of buffers synthesized from now on
    ///
    /// Buffers already queued or checked out keep their size, so changing
    /// this on a warm pool produces a mix of sizes. One record may already
    /// be synthesized and waiting at the head with the previous size.
    ///
    /// A size of 0 is ignored, so every take still yields a usable block.
    #[inline]
    pub fn set_block_size(&self, size: usize) {
        if size == 0 {
            tracing::warn!("ignoring zero buffer pool block size");
            return;
        }
        self.shared.block_size.store(size, Ordering::Relaxed);
    }

    /// Size of buffers the pool currently synthesizes
    #[inline]
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.shared.block_size.load(Ordering::Relaxed)
    }

    /// Take a buffer, blocking until the worker hands one over
    ///
    /// If the worker has stopped, a fresh buffer is allocated instead.
    #[must_use]
    pub fn take(&self) -> Vec<u8> {
        self.take_rx
            .recv()
            .unwrap_or_else(|_| vec![0u8; self.block_size()])
    }

    /// Take a buffer, giving up after `timeout`
    ///
    /// An abandoned take leaves the pool untouched.
    ///
    /// # Errors
    ///
    /// [`PoolError::Timeout`] if no handoff happened in time,
    /// [`PoolError::Disconnected`] if the worker has stopped.
    pub fn take_timeout(&self, timeout: Duration) -> Result<Vec<u8>> {
        self.take_rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => PoolError::Timeout(timeout),
            RecvTimeoutError::Disconnected => PoolError::Disconnected,
        })
    }

    /// Give a buffer back, blocking until the worker accepts it
    ///
    /// If the worker has stopped the buffer is simply dropped.
    pub fn give_back(&self, buffer: Vec<u8>) {
        if self.return_tx.send(buffer).is_err() {
            tracing::trace!("pool worker gone, dropping returned buffer");
        }
    }

    /// Give a buffer back, giving up after `timeout`
    ///
    /// On failure the buffer is dropped; the pool never sees it.
    ///
    /// # Errors
    ///
    /// [`PoolError::Timeout`] if the worker did not accept the buffer in time,
    /// [`PoolError::Disconnected`] if the worker has stopped.
    pub fn give_back_timeout(&self, buffer: Vec<u8>, timeout: Duration) -> Result<()> {
        self.return_tx
            .send_timeout(buffer, timeout)
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => PoolError::Timeout(timeout),
                SendTimeoutError::Disconnected(_) => PoolError::Disconnected,
            })
    }

    /// Take a buffer wrapped in a guard that gives it back on drop
    ///
    /// # Examples
    ///
    /// ```
    /// use tidepool::BufferPool;
    ///
    /// let pool = BufferPool::new();
    /// {
    ///     let mut buffer = pool.get();
    ///     buffer[0] = 42;
    ///     // Buffer returned to the pool here
    /// }
    /// ```
    #[inline]
    #[must_use]
    pub fn get(&self) -> PooledBuffer {
        PooledBuffer::new(self.take(), self.clone())
    }

    /// Ask the worker to run an eviction sweep now
    ///
    /// Blocks until the worker picks up the request; the sweep itself runs
    /// on the worker right after.
    pub fn trigger_eviction(&self) {
        if self.evict_tx.send(EvictTrigger).is_err() {
            tracing::trace!("pool worker gone, eviction trigger dropped");
        }
    }

    /// Snapshot of the worker's counters
    #[inline]
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
