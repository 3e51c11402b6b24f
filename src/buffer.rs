//! RAII wrapper for pooled buffers with automatic return on drop

use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};

use crate::BufferPool;

/// A buffer taken from the pool that gives itself back when dropped.
///
/// Derefs to `[u8]`, so the buffer keeps its fixed length while checked out.
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
///
/// Dropping blocks until the worker accepts the buffer, exactly like
/// [`BufferPool::give_back`].
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: BufferPool,
    detached: bool,
}

impl PooledBuffer {
    pub(crate) fn new(buffer: Vec<u8>, pool: BufferPool) -> Self {
        Self {
            buffer,
            pool,
            detached: false,
        }
    }

    /// Returns the length of the buffer in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the capacity of the buffer in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Returns `true` if the buffer has a length of 0.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the guard and returns the underlying `Vec<u8>`.
    ///
    /// The buffer is NOT returned to the pool. Hand it back later with
    /// [`BufferPool::give_back`] if it should be reused.
    ///
    /// # Examples
    ///
    /// ```
    /// use tidepool::BufferPool;
    ///
    /// let pool = BufferPool::new();
    /// let buffer = pool.get();
    /// let vec: Vec<u8> = buffer.into_inner();
    /// pool.give_back(vec);
    /// ```
    pub fn into_inner(mut self) -> Vec<u8> {
        self.detached = true;
        mem::take(&mut self.buffer)
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if !self.detached {
            self.pool.give_back(mem::take(&mut self.buffer));
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl AsRef<[u8]> for PooledBuffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}

impl AsMut<[u8]> for PooledBuffer {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}

// tokio-uring trait implementations for zero-copy I/O
#[cfg(feature = "tokio-uring")]
mod tokio_uring_support {
    use super::PooledBuffer;
    use tokio_uring::buf::{IoBuf, IoBufMut};

    // SAFETY: the Vec inside a PooledBuffer is never reallocated while the guard
    // exists, so its pointer stays valid. bytes_init() reports the initialized
    // length and bytes_total() the allocation size.
    unsafe impl IoBuf for PooledBuffer {
        fn stable_ptr(&self) -> *const u8 {
            self.buffer.as_ptr()
        }

        fn bytes_init(&self) -> usize {
            self.buffer.len()
        }

        fn bytes_total(&self) -> usize {
            self.buffer.capacity()
        }
    }

    // SAFETY: as above; set_init() is only called by tokio-uring after it has
    // written `pos` bytes, and pooled buffers are fully initialized up to len.
    unsafe impl IoBufMut for PooledBuffer {
        fn stable_mut_ptr(&mut self) -> *mut u8 {
            self.buffer.as_mut_ptr()
        }

        unsafe fn set_init(&mut self, pos: usize) {
            if self.buffer.len() < pos {
                // SAFETY: tokio-uring has initialized the first `pos` bytes.
                unsafe {
                    self.buffer.set_len(pos);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::BufferPool;

    fn pool() -> BufferPool {
        BufferPool::builder()
            .block_size(1024)
            .disable_eviction_timer()
            .build()
    }

    #[test]
    fn test_pooled_buffer_deref() {
        let pool = pool();
        let mut buffer = pool.get();

        assert_eq!(buffer.len(), 1024);

        buffer[0] = 42;
        assert_eq!(buffer[0], 42);
    }

    #[test]
    fn test_pooled_buffer_auto_return() {
        let pool = pool();

        {
            let mut buffer = pool.get();
            buffer.fill(9);
        }

        // The dropped buffer is queued behind the head record
        let found = (0..3).map(|_| pool.take()).any(|b| b.iter().all(|&x| x == 9));
        assert!(found, "Buffer was not reused");
        assert_eq!(pool.stats().returned, 1);
    }

    #[test]
    fn test_pooled_buffer_explicit_drop() {
        let pool = pool();
        let buffer = pool.get();
        drop(buffer);
        let _ = pool.take();
        assert_eq!(pool.stats().returned, 1);
    }

    #[test]
    fn test_pooled_buffer_as_ref() {
        let pool = pool();
        let mut buffer = pool.get();
        buffer[0] = 42;

        let slice: &[u8] = buffer.as_ref();
        assert_eq!(slice[0], 42);
    }

    #[test]
    fn test_pooled_buffer_as_mut() {
        let pool = pool();
        let mut buffer = pool.get();

        let slice: &mut [u8] = buffer.as_mut();
        slice[0] = 42;
        assert_eq!(buffer[0], 42);
    }

    #[test]
    fn test_pooled_buffer_debug() {
        let pool = pool();
        let buffer = pool.get();

        let debug_str = format!("{buffer:?}");
        assert!(debug_str.contains("PooledBuffer"));
        assert!(debug_str.contains("len"));
        assert!(debug_str.contains("capacity"));
    }

    #[test]
    fn test_into_inner_detaches() {
        let pool = pool();
        let mut buffer = pool.get();
        buffer[0] = 42;

        let vec = buffer.into_inner();
        assert_eq!(vec.len(), 1024);
        assert_eq!(vec[0], 42);

        // Sync with the worker, then confirm nothing came back
        let _ = pool.take_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(pool.stats().returned, 0);
    }

    #[test]
    fn test_guard_keeps_private_pool_alive() {
        let pool = pool();
        let buffer = pool.get();
        drop(pool);

        // The guard still holds a handle, so the return is accepted
        drop(buffer);
    }

    #[cfg(feature = "tokio-uring")]
    #[test]
    fn test_tokio_uring_traits() {
        use tokio_uring::buf::{IoBuf, IoBufMut};

        let pool = pool();
        let mut buffer = pool.get();

        assert!(buffer.bytes_total() >= 1024);
        assert_eq!(buffer.bytes_init(), 1024);

        let ptr = buffer.stable_mut_ptr();
        assert!(!ptr.is_null());
    }
}
