use core::time::Duration;
use std::time::Instant;

use crate::mutex::{Condvar, Mutex};

/// A one-shot value cell that any number of threads can block on.
///
/// The first [`Slot::fill`] wins and wakes every waiter; later fills are
/// ignored. Waiters never hold any lock other than the slot's own while
/// suspended.
#[derive(Debug)]
pub(crate) struct Slot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T: Clone> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Stores `value` and releases all waiters. Returns `false` if the slot
    /// was already filled.
    pub(crate) fn fill(&self, value: T) -> bool {
        let mut slot = self.value.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        drop(slot);
        self.ready.notify_all();
        true
    }

    pub(crate) fn peek(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Blocks until the slot is filled or `timeout` elapses.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let mut slot = self.value.lock();
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while slot.is_none() {
                    if self.ready.wait_until(&mut slot, deadline).timed_out() {
                        break;
                    }
                }
            }
            // Too far in the future to represent: wait without a deadline.
            None => {
                while slot.is_none() {
                    self.ready.wait(&mut slot);
                }
            }
        }
        slot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn first_fill_wins() {
        let slot = Slot::new();
        assert!(slot.fill(1));
        assert!(!slot.fill(2));
        assert_eq!(slot.peek(), Some(1));
        assert_eq!(slot.wait_timeout(Duration::ZERO), Some(1));
    }

    #[test]
    fn times_out_when_empty() {
        let slot: Slot<u8> = Slot::new();
        let start = Instant::now();
        assert_eq!(slot.wait_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wakes_every_waiter() {
        let slot = Arc::new(Slot::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || slot.wait_timeout(Duration::from_secs(5)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        slot.fill("done");

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Some("done"));
        }
    }

    #[test]
    fn unbounded_timeout_still_returns() {
        let slot = Arc::new(Slot::new());
        let filler = Arc::clone(&slot);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            filler.fill(7);
        });
        assert_eq!(slot.wait_timeout(Duration::MAX), Some(7));
        handle.join().unwrap();
    }
}
