use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Cancellation signal shared between the controller and its worker loops.
///
/// The pacing delay must be a cancellable wait rather than a plain sleep so
/// that pause() is responsive, so the token carries a condvar that wakes any
/// waiter the moment cancel() is called.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Signal cancellation and wake every waiter.
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        match flag.lock() {
            Ok(mut cancelled) => {
                *cancelled = true;
                condvar.notify_all();
            }
            Err(poisoned) => {
                *poisoned.into_inner() = true;
                condvar.notify_all();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        match flag.lock() {
            Ok(cancelled) => *cancelled,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Wait for up to `timeout`, returning early if cancelled.
    /// Returns true if the token was cancelled before the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let deadline = std::time::Instant::now() + timeout;

        let mut cancelled = match flag.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        while !*cancelled {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = match condvar.wait_timeout(cancelled, deadline - now) {
                Ok(result) => result,
                Err(poisoned) => {
                    let result = poisoned.into_inner();
                    (result.0, result.1)
                }
            };
            cancelled = guard;
        }

        true
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
