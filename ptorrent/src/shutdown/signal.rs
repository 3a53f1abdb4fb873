use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A cancellation token shared by the accept loop, background threads and
/// per-session workers.
///
/// Cloning is cheap; every clone observes the same signal. Waiters block on
/// a condvar so `shutdown()` wakes them immediately instead of at their
/// next poll.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Flips the signal and wakes every waiter. Returns `true` only for the
    /// call that actually flipped it, making shutdown idempotent.
    pub fn shutdown(&self) -> bool {
        let (lock, condvar) = &*self.inner;
        let mut down = self.lock_flag(lock);
        let first = !*down;
        *down = true;
        condvar.notify_all();
        first
    }

    pub fn is_shutdown(&self) -> bool {
        let (lock, _) = &*self.inner;
        *self.lock_flag(lock)
    }

    /// Sleeps up to `timeout`, waking early on shutdown. Returns `true` if
    /// the signal is down when the wait ends.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let mut down = self.lock_flag(lock);
        let deadline = std::time::Instant::now() + timeout;
        while !*down {
            let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => break,
            };
            let (guard, _) = condvar
                .wait_timeout(down, remaining)
                .unwrap(); // Unwrap is safe: no holder of the lock can panic.
            down = guard;
        }
        *down
    }

    fn lock_flag<'a>(&self, lock: &'a Mutex<bool>) -> std::sync::MutexGuard<'a, bool> {
        lock.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }
}
