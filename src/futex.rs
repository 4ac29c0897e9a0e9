// Raw Linux futex(2) wait/wake wrappers.
//
// The teacher crate's blocking primitive (`waiter.rs`) is a portable
// condvar+mutex pair so it can also run on macOS/Windows. This spec names a
// literal 32-bit futex word in the shared channel header (`spec.md` §3, §6),
// which only a real futex syscall satisfies, so this module exists where the
// teacher has none. Styled after `platform/posix.rs`'s raw-syscall/errno
// conventions.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

use crate::error::{CortezError, Result};

/// Outcome of a futex wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken by a futex_wake, or the value no longer matched `expected`.
    Woken,
    /// The deadline elapsed first.
    TimedOut,
}

/// Block until `*word != expected`, a wake arrives, or `timeout` elapses.
///
/// `timeout: None` blocks indefinitely. A `EINTR` (signal interrupt) is
/// treated as a spurious wake — the spec requires callers to re-sample and
/// loop silently rather than surface it.
pub fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> Result<WaitOutcome> {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as i64,
    });
    let ts_ptr = ts
        .as_ref()
        .map(|t| t as *const libc::timespec)
        .unwrap_or(std::ptr::null());

    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0,
        )
    };

    if rc == 0 {
        return Ok(WaitOutcome::Woken);
    }

    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
    match errno {
        libc::EAGAIN => Ok(WaitOutcome::Woken), // value already changed: treat as woken
        libc::ETIMEDOUT => Ok(WaitOutcome::TimedOut),
        libc::EINTR => Ok(WaitOutcome::Woken), // caller re-samples and loops
        _ => Err(CortezError::Internal),
    }
}

/// Wake up to `num_waiters` threads blocked on `word`.
pub fn wake(word: &AtomicU32, num_waiters: i32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE,
            num_waiters,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[test]
    fn wait_times_out_when_value_unchanged() {
        let word = Arc::new(AtomicU32::new(0));
        let outcome = wait(&word, 0, Some(Duration::from_millis(20))).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn wait_returns_immediately_on_value_mismatch() {
        let word = AtomicU32::new(5);
        let outcome = wait(&word, 0, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(outcome, WaitOutcome::Woken);
    }

    #[test]
    fn wake_unblocks_a_waiting_thread() {
        let word = Arc::new(AtomicU32::new(0));
        let w2 = Arc::clone(&word);
        let handle = std::thread::spawn(move || wait(&w2, 0, None).unwrap());
        std::thread::sleep(Duration::from_millis(50));
        word.store(1, Ordering::SeqCst);
        wake(&word, 1);
        let outcome = handle.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Woken);
    }
}
