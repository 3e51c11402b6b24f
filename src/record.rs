use std::fmt;

/// A pooled buffer together with the second it was last seen by the worker.
///
/// Records never leave the worker: callers only ever receive `data`.
pub(crate) struct BufferRecord {
    /// mlock guard held while the record is idle in the pool.
    /// Declared before `data` so the pages are unlocked before they are freed.
    pub(crate) lock: Option<region::LockGuard>,
    pub(crate) data: Vec<u8>,
    /// Clock reading at creation or at the most recent return
    pub(crate) last_used: u64,
}

impl BufferRecord {
    /// Zeroed buffer of `block_size` bytes stamped with `now`
    #[inline]
    pub(crate) fn zeroed(block_size: usize, now: u64) -> Self {
        Self::returned(vec![0u8; block_size], now)
    }

    /// Wrap a buffer handed back by a caller
    #[inline]
    pub(crate) fn returned(data: Vec<u8>, now: u64) -> Self {
        Self {
            lock: None,
            data,
            last_used: now,
        }
    }

    /// Lock the buffer in RAM until the record is handed out or dropped
    #[inline]
    pub(crate) fn pin(&mut self) {
        self.lock = crate::os::pin_buffer(&self.data);
    }

    /// Give up the record, unlocking its pages, and keep only the buffer
    #[inline]
    pub(crate) fn into_data(self) -> Vec<u8> {
        let Self { lock, data, .. } = self;
        drop(lock);
        data
    }

    /// Idle for strictly longer than `threshold` seconds at `now`
    #[inline]
    pub(crate) fn is_expired(&self, now: u64, threshold: u64) -> bool {
        now.saturating_sub(self.last_used) > threshold
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for BufferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRecord")
            .field("len", &self.data.len())
            .field("last_used", &self.last_used)
            .field("pinned", &self.lock.is_some())
            .finish()
    }
}
