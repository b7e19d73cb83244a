// Small synchronization primitives shared by the renderer and the frame dump worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Boolean flag readable and writable from any thread.
#[derive(Debug, Default)]
pub struct Flag(AtomicBool);

impl Flag {
    pub const fn new(initial: bool) -> Self {
        Self(AtomicBool::new(initial))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag and reports whether it was set.
    pub fn test_and_clear(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Auto-reset event: `wait` consumes one `set`.
#[derive(Debug, Default)]
pub struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut signaled = match self.signaled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *signaled = true;
        self.cond.notify_one();
    }

    pub fn wait(&self) {
        let mut signaled = match self.signaled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !*signaled {
            signaled = match self.cond.wait(signaled) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *signaled = false;
    }

    /// Waits at most `timeout`. Returns true if the event fired.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let guard = match self.signaled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (mut signaled, _) = match self.cond.wait_timeout_while(guard, timeout, |s| !*s) {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        let fired = *signaled;
        *signaled = false;
        fired
    }

    pub fn reset(&self) {
        if let Ok(mut signaled) = self.signaled.lock() {
            *signaled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn flag_test_and_clear() {
        let flag = Flag::new(false);
        assert!(!flag.test_and_clear());
        flag.set();
        assert!(flag.is_set());
        assert!(flag.test_and_clear());
        assert!(!flag.is_set());
    }

    #[test]
    fn event_wakes_waiter_on_other_thread() {
        let event = Arc::new(Event::new());
        let worker = {
            let event = Arc::clone(&event);
            std::thread::spawn(move || event.wait())
        };
        event.set();
        worker.join().unwrap();
    }

    #[test]
    fn event_wait_for_times_out() {
        let event = Event::new();
        assert!(!event.wait_for(Duration::from_millis(10)));
        event.set();
        assert!(event.wait_for(Duration::from_millis(10)));
        // Auto-reset.
        assert!(!event.wait_for(Duration::from_millis(1)));
    }
}
