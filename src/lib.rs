//! # TidePool - Process-Wide Buffer Pool Driven by a Single Actor
//!
//! `TidePool` amortizes allocation cost for hot paths that keep needing and
//! releasing scratch byte buffers of one size (network reads, serialization).
//!
//! - **Single owner**: one worker thread owns every idle buffer; callers talk to
//!   it only through channels, so the idle queue needs no lock
//! - **Rendezvous handoff**: takes and returns complete only when the worker
//!   serves them, so a slow worker throttles callers instead of queueing work
//! - **Never starves**: an empty pool synthesizes a zeroed buffer on demand
//! - **Idle eviction**: buffers unused for 30s are dropped on a 60s cadence
//! - **OS release with hysteresis**: memory is handed back to the OS only after
//!   256MB of evictions have piled up
//!
//! # Quick Start
//!
//! ```rust
//! // The process-wide pool, started on first use
//! let pool = tidepool::global();
//!
//! let mut buffer = pool.take();
//! buffer[0] = 1;
//! // ... fill and use the buffer ...
//! pool.give_back(buffer);
//! ```
//!
//! The raw conduits are available for callers that want to `select!` over
//! them alongside their own channels:
//!
//! ```rust
//! let pool = tidepool::global();
//! let buffer = pool.take_source().recv().unwrap();
//! pool.return_sink().send(buffer).unwrap();
//! ```
//!
//! # Block Size
//!
//! The global pool's block size is fixed by whichever call creates it; a size
//! passed to [`global_with_block_size`] after that is ignored. Private pools
//! with their own settings come from [`BufferPool::builder`].
//!
//! # Unbounded Growth
//!
//! The pool does not cap the number of live buffers. A take on an empty pool
//! always allocates, and returns are always accepted; only idle eviction
//! shrinks the pool.

use std::sync::OnceLock;

mod buffer;
mod clock;
mod config;
mod error;
mod os;
mod pool;
mod queue;
mod record;
mod stats;
mod timer;
mod worker;

pub use buffer::PooledBuffer;
pub use clock::{Clock, MonotonicClock};
pub use config::{
    Builder, DEFAULT_BLOCK_SIZE, DEFAULT_EVICTION_INTERVAL, DEFAULT_IDLE_THRESHOLD,
    DEFAULT_OS_RECLAIM_THRESHOLD,
};
pub use crossbeam_channel::{Receiver, Sender};
pub use error::{PoolError, Result};
pub use os::{MemoryReclaimer, OsReclaimer};
pub use pool::BufferPool;
pub use stats::PoolStats;

static GLOBAL: OnceLock<BufferPool> = OnceLock::new();

/// Number of times the global pool's worker and timer were started
#[cfg(test)]
static GLOBAL_STARTS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// The process-wide pool, created with [`DEFAULT_BLOCK_SIZE`] on first use
///
/// # Panics
///
/// Panics if the pool threads cannot be spawned on first use.
#[inline]
pub fn global() -> &'static BufferPool {
    global_with_block_size(DEFAULT_BLOCK_SIZE)
}

/// The process-wide pool, created with `block_size` if this is the first call
///
/// Later calls return the same pool and ignore `block_size`. Concurrent first
/// calls start exactly one worker and one timer.
///
/// # Panics
///
/// Panics on first use if `block_size` is 0 or the pool threads cannot be
/// spawned.
pub fn global_with_block_size(block_size: usize) -> &'static BufferPool {
    GLOBAL.get_or_init(|| {
        tracing::info!(block_size, "starting process-wide buffer pool");
        #[cfg(test)]
        GLOBAL_STARTS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Builder::default().block_size(block_size).build()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_global_is_a_singleton() {
        init_tracing();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                thread::spawn(move || {
                    let pool = if i % 2 == 0 { global() } else { global_with_block_size(8192) };
                    pool as *const BufferPool as usize
                })
            })
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(GLOBAL_STARTS.load(std::sync::atomic::Ordering::SeqCst), 1);

        let size = global().block_size();
        assert!(size == DEFAULT_BLOCK_SIZE || size == 8192);

        // A later size request is ignored
        let again = global_with_block_size(1);
        assert!(std::ptr::eq(again, global()));
        assert_eq!(again.block_size(), size);
        assert_eq!(GLOBAL_STARTS.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_global_serves_buffers() {
        let pool = global();
        let buf = pool.take_timeout(Duration::from_secs(5)).unwrap();
        assert!(!buf.is_empty());
        pool.give_back_timeout(buf, Duration::from_secs(5)).unwrap();

        let guard = pool.get();
        assert!(!guard.is_empty());
    }
}
