//! Process-wide configuration (C15, ambient): small `OnceLock`/atomic
//! singletons mutated only through a dedicated single-writer setter, never a
//! bare `static mut` (§4.14/§5).

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static BATCH_THREADS: AtomicI32 = AtomicI32::new(0);
static RECOMPRESS_THREADS: AtomicI32 = AtomicI32::new(0);
static ANALYTICS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Set the default thread count used by [`crate::pipeline`] batch calls when
/// no explicit `thread_count` argument is given. `0` restores auto-detect.
pub fn set_batch_threads(threads: i32) {
    BATCH_THREADS.store(threads, Ordering::Relaxed);
}

pub(crate) fn batch_threads_default() -> i32 {
    BATCH_THREADS.load(Ordering::Relaxed)
}

/// Set the default thread count used by [`crate::png::recompress_batch`]
/// when no explicit thread count is given.
pub fn set_recompress_threads(threads: i32) {
    RECOMPRESS_THREADS.store(threads, Ordering::Relaxed);
}

pub(crate) fn recompress_threads_default() -> i32 {
    RECOMPRESS_THREADS.load(Ordering::Relaxed)
}

/// Enable or disable per-thread analytics collection during batch calls.
pub fn set_batch_analytics(enabled: bool) {
    ANALYTICS_ENABLED.store(enabled, Ordering::Relaxed);
}

pub(crate) fn batch_analytics_enabled() -> bool {
    ANALYTICS_ENABLED.load(Ordering::Relaxed)
}

/// Hint the OS to lower (or restore) the current thread's scheduling
/// priority, so a caller can background a heavy batch call. Best-effort:
/// returns `Ok(false)` on platforms with no such hint (§5).
pub fn set_thread_background_priority(background: bool) -> std::io::Result<bool> {
    #[cfg(unix)]
    {
        let nice = if background { 10 } else { 0 };
        // SAFETY: setpriority with PRIO_PROCESS and pid 0 affects only the
        // calling thread's process-level niceness; no pointers involved.
        let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
        if result == 0 {
            Ok(true)
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
    #[cfg(not(unix))]
    {
        let _ = background;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_thread_default_round_trips() {
        set_batch_threads(6);
        assert_eq!(batch_threads_default(), 6);
        set_batch_threads(0);
        assert_eq!(batch_threads_default(), 0);
    }

    #[test]
    fn analytics_flag_round_trips() {
        set_batch_analytics(true);
        assert!(batch_analytics_enabled());
        set_batch_analytics(false);
        assert!(!batch_analytics_enabled());
    }

    #[test]
    fn background_priority_hint_does_not_error_on_this_platform() {
        let result = set_thread_background_priority(true);
        assert!(result.is_ok());
        let _ = set_thread_background_priority(false);
    }
}
