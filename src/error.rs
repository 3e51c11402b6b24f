//! Error types for pool construction and bounded waits

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors surfaced by the pool's helper APIs.
///
/// The take and return conduits themselves never report pool errors; these
/// only come from [`Builder::try_build`](crate::Builder::try_build) and the
/// `*_timeout` helpers on [`BufferPool`](crate::BufferPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// The worker did not complete the handoff within the caller's deadline
    #[error("buffer handoff timed out after {0:?}")]
    Timeout(Duration),

    /// The worker thread is no longer running
    #[error("buffer pool worker is not running")]
    Disconnected,

    /// A builder setting was rejected
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(&'static str),

    /// The worker or timer thread could not be spawned
    #[error("failed to spawn pool thread: {0}")]
    Spawn(#[from] io::Error),
}
