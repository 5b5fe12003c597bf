//! Lock plus condition pair for cross-thread wake-ups.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A mutex/condvar pair used only around wait and notify.
///
/// The guarded state itself lives elsewhere (atomics, slots, the cache);
/// the lock exists so a waiter can re-check that state and block without a
/// wake-up slipping in between.
pub(crate) struct Signal {
    lock: Mutex<()>,
    condition: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            condition: Condvar::new(),
        }
    }

    /// Wakes all current waiters.
    ///
    /// Takes the lock so a notification cannot fall between a waiter's
    /// state re-check and its wait.
    pub(crate) fn notify_all(&self) {
        let _guard = self.lock.lock();
        self.condition.notify_all();
    }

    /// Waits up to `timeout` for a notification.
    pub(crate) fn wait_for(&self, timeout: Duration) {
        let mut guard = self.lock.lock();
        let _ = self.condition.wait_for(&mut guard, timeout);
    }

    /// Waits up to `timeout`, unless `still_waiting` already fails under
    /// the lock.
    pub(crate) fn wait_if(&self, still_waiting: impl FnOnce() -> bool, timeout: Duration) {
        let mut guard = self.lock.lock();
        if still_waiting() {
            let _ = self.condition.wait_for(&mut guard, timeout);
        }
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_for_times_out() {
        let signal = Signal::new();
        let start = Instant::now();
        signal.wait_for(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let signal = Arc::new(Signal::new());
        let ready = Arc::new(AtomicBool::new(false));

        let waiter = {
            let signal = Arc::clone(&signal);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                let start = Instant::now();
                while !ready.load(Ordering::Acquire) {
                    signal.wait_for(Duration::from_secs(5));
                }
                start.elapsed()
            })
        };

        thread::sleep(Duration::from_millis(30));
        ready.store(true, Ordering::Release);
        signal.notify_all();

        let elapsed = waiter.join().unwrap();
        assert!(elapsed < Duration::from_secs(4));
    }

    #[test]
    fn test_wait_if_skips_when_condition_fails() {
        let signal = Signal::new();
        let start = Instant::now();
        signal.wait_if(|| false, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
