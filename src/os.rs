//! Operating-system memory primitives

use std::fmt;

/// Pin buffer memory to RAM using mlock
///
/// Attempts to lock the buffer in physical RAM to prevent swapping. The
/// pages stay locked until the returned guard is dropped, which must happen
/// before the buffer itself is freed.
///
/// # Best-effort
///
/// Pinning may fail due to:
/// - Insufficient permissions (needs CAP_IPC_LOCK on Linux)
/// - Resource limits (RLIMIT_MEMLOCK)
/// - Platform limitations
///
/// Failures return `None`; the buffer is still usable unpinned.
#[inline]
pub(crate) fn pin_buffer(buffer: &[u8]) -> Option<region::LockGuard> {
    if buffer.is_empty() {
        return None;
    }

    match region::lock(buffer.as_ptr(), buffer.len()) {
        Ok(guard) => Some(guard),
        Err(err) => {
            tracing::trace!(len = buffer.len(), %err, "mlock failed, buffer left unpinned");
            None
        }
    }
}

/// Kilobytes of memory this process currently has locked, from `/proc/self/status`
#[cfg(all(test, target_os = "linux"))]
pub(crate) fn locked_kib() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmLck:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kib| kib.parse().ok())
}

/// Serializes tests that mlock memory, since `VmLck` is process-wide
#[cfg(test)]
pub(crate) static MLOCK_TESTS: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

/// Hands unused committed memory back to the operating system.
///
/// The worker calls this after its eviction sweeps have dropped more than
/// the configured threshold of bytes.
pub trait MemoryReclaimer: Send + Sync + fmt::Debug {
    /// Release whatever the allocator is holding but no longer using
    fn release_unused(&self);
}

/// Default reclaimer backed by the system allocator.
///
/// On glibc Linux this is `malloc_trim(0)`; on other targets freed pages are
/// already returned by the allocator and the call is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsReclaimer;

impl MemoryReclaimer for OsReclaimer {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn release_unused(&self) {
        // SAFETY: malloc_trim only walks the allocator's own free lists and
        // takes no pointers from us.
        let released = unsafe { libc::malloc_trim(0) };
        tracing::trace!(released = released != 0, "malloc_trim");
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn release_unused(&self) {}
}

/// Reclaimer that only counts invocations
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CountingReclaimer {
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl CountingReclaimer {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl MemoryReclaimer for CountingReclaimer {
    fn release_unused(&self) {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_empty_buffer_is_noop() {
        assert!(pin_buffer(&[]).is_none());
    }

    #[test]
    fn test_pin_released_when_guard_dropped() {
        let _serial = MLOCK_TESTS.lock();
        let buf = vec![0u8; 4096];
        let guard = pin_buffer(&buf);

        #[cfg(target_os = "linux")]
        let baseline = guard.as_ref().and(locked_kib());
        drop(guard);

        #[cfg(target_os = "linux")]
        if let Some(held) = baseline {
            assert!(locked_kib().unwrap() < held);
        }
        assert_eq!(buf.len(), 4096);
    }

    #[test]
    fn test_os_reclaimer_runs() {
        let scratch: Vec<Vec<u8>> = (0..16).map(|_| vec![1u8; 64 * 1024]).collect();
        drop(scratch);
        OsReclaimer.release_unused();
    }

    #[test]
    fn test_counting_reclaimer() {
        let reclaimer = CountingReclaimer::default();
        reclaimer.release_unused();
        reclaimer.release_unused();
        assert_eq!(reclaimer.calls(), 2);
    }
}
