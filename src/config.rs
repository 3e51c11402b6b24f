use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::error::{PoolError, Result};
use crate::os::{MemoryReclaimer, OsReclaimer};

/// Default size of every synthesized buffer (4KB)
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Default idle age after which a pending buffer may be evicted
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(30);

/// Default period of the eviction timer
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of evicted bytes that triggers an OS memory release (256MB)
pub const DEFAULT_OS_RECLAIM_THRESHOLD: u64 = 256 * 1024 * 1024;

/// Builder for configuring a `BufferPool`
///
/// Follows the idiomatic Rust builder pattern. Use `BufferPool::builder()` to create.
/// Each built pool owns its own worker and timer threads; use
/// [`crate::global`] for the process-wide instance.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tidepool::BufferPool;
///
/// let pool = BufferPool::builder()
///     .block_size(16 * 1024)
///     .idle_threshold(Duration::from_secs(10))
///     .build();
/// assert_eq!(pool.take().len(), 16 * 1024);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    block_size: Option<usize>,
    idle_threshold: Option<Duration>,
    eviction_interval: Option<Duration>,
    eviction_timer: Option<bool>,
    os_reclaim_threshold: Option<u64>,
    pinned_memory: Option<bool>,
    clock: Option<Arc<dyn Clock>>,
    reclaimer: Option<Arc<dyn MemoryReclaimer>>,
}

impl Builder {
    /// Set the size of every buffer the pool synthesizes
    ///
    /// Default: 4KB
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = Some(size);
        self
    }

    /// Set how long a buffer may sit unused in the pool before eviction
    ///
    /// A buffer is evicted once its idle age strictly exceeds this value,
    /// measured in whole seconds. Must be at least one second; any
    /// sub-second remainder is dropped.
    /// Default: 30 seconds
    pub fn idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = Some(threshold);
        self
    }

    /// Set the period of the background eviction timer
    ///
    /// Default: 60 seconds
    pub fn eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = Some(interval);
        self
    }

    /// Do not start the background eviction timer
    ///
    /// Sweeps then only run on [`BufferPool::trigger_eviction`](crate::BufferPool::trigger_eviction).
    pub fn disable_eviction_timer(mut self) -> Self {
        self.eviction_timer = Some(false);
        self
    }

    /// Set how many evicted bytes accumulate before memory is released to the OS
    ///
    /// The release runs once the running total strictly exceeds this value,
    /// then the total starts again from zero.
    /// Default: 256MB
    pub fn os_reclaim_threshold(mut self, bytes: u64) -> Self {
        self.os_reclaim_threshold = Some(bytes);
        self
    }

    /// Enable pinned memory (mlock) for synthesized buffers
    ///
    /// When enabled, buffers are locked in RAM and won't be swapped to disk.
    ///
    /// Requires sufficient permissions (CAP_IPC_LOCK on Linux or similar).
    /// Falls back gracefully if pinning fails.
    /// Default: false
    pub fn pinned_memory(mut self, enabled: bool) -> Self {
        self.pinned_memory = Some(enabled);
        self
    }

    /// Replace the clock used to stamp idle buffers
    ///
    /// Default: [`MonotonicClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the primitive that hands freed memory back to the OS
    ///
    /// Default: [`OsReclaimer`]
    pub fn reclaimer(mut self, reclaimer: Arc<dyn MemoryReclaimer>) -> Self {
        self.reclaimer = Some(reclaimer);
        self
    }

    /// Validate the settings and start the pool's worker and timer threads
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] for a zero block size, an idle
    /// threshold under one second or a zero eviction interval, and [`PoolError::Spawn`] if a thread cannot be started.
    pub fn try_build(self) -> Result<crate::BufferPool> {
        let config = self.into_config()?;
        crate::BufferPool::with_config(config)
    }

    /// Build the `BufferPool` with the configured settings
    ///
    /// Any settings not explicitly set use the defaults above.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid or the pool threads cannot be
    /// spawned. Use [`Builder::try_build`] to handle those cases.
    pub fn build(self) -> crate::BufferPool {
        self.try_build()
            .unwrap_or_else(|err| panic!("failed to start buffer pool: {err}"))
    }

    pub(crate) fn into_config(self) -> Result<PoolConfig> {
        let block_size = self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        if block_size == 0 {
            return Err(PoolError::InvalidConfig("block_size must be greater than 0"));
        }

        let idle_threshold = self.idle_threshold.unwrap_or(DEFAULT_IDLE_THRESHOLD);
        if idle_threshold < Duration::from_secs(1) {
            return Err(PoolError::InvalidConfig("idle_threshold must be at least one second"));
        }

        let eviction_interval = match self.eviction_timer {
            Some(false) => None,
            _ => Some(self.eviction_interval.unwrap_or(DEFAULT_EVICTION_INTERVAL)),
        };
        if eviction_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(PoolError::InvalidConfig("eviction_interval must be non-zero"));
        }

        Ok(PoolConfig {
            block_size,
            idle_threshold_secs: idle_threshold.as_secs(),
            eviction_interval,
            os_reclaim_threshold: self.os_reclaim_threshold.unwrap_or(DEFAULT_OS_RECLAIM_THRESHOLD),
            pinned_memory: self.pinned_memory.unwrap_or(false),
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            reclaimer: self.reclaimer.unwrap_or_else(|| Arc::new(OsReclaimer)),
        })
    }
}

/// Internal configuration for buffer pool (not part of public API)
#[derive(Debug, Clone)]
pub(crate) struct PoolConfig {
    /// Initial block size; later changes go through the pool's shared atomic
    pub block_size: usize,
    pub idle_threshold_secs: u64,
    /// `None` when the background timer is disabled
    pub eviction_interval: Option<Duration>,
    pub os_reclaim_threshold: u64,
    pub pinned_memory: bool,
    pub clock: Arc<dyn Clock>,
    pub reclaimer: Arc<dyn MemoryReclaimer>,
}
