use core::time::Duration;
use std::{
    collections::VecDeque,
    thread,
    time::Instant,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    mutex::Mutex,
};

/// The admission log grows past this on demand.
const INITIAL_CAPACITY: u32 = 64;

/// A call budget: at most `max_calls` admissions in any trailing `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateLimit {
    pub max_calls: u32,
    pub window: Duration,
}

impl RateLimit {
    /// The venue accepts 50 requests per second; 45 leaves headroom for
    /// calls made outside this crate.
    pub const DEFAULT: Self = Self {
        max_calls: 45,
        window: Duration::from_secs(1),
    };

    pub const fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_calls == 0 {
            return Err(Error::config("rate limit max_calls must be greater than 0"));
        }
        if self.window.is_zero() {
            return Err(Error::config("rate limit window must be non-zero"));
        }
        Ok(())
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A sliding-window admission gate.
///
/// Callers are never rejected: [`RateLimiter::admit`] puts the calling thread
/// to sleep until the call fits in the budget. Only outbound call sites go
/// through the limiter. Inbound delivery must not, or a waiting caller could
/// end up blocking the reader thread that would wake it.
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter for `limit`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the budget or window is zero.
    pub fn new(limit: RateLimit) -> Result<Self> {
        limit.validate()?;
        Ok(Self {
            limit,
            admitted: Mutex::new(VecDeque::with_capacity(
                limit.max_calls.min(INITIAL_CAPACITY) as usize,
            )),
        })
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Drops timestamps that fell out of the window and reports how long the
    /// caller has to wait, if at all.
    fn time_until_ready_locked(
        admitted: &mut VecDeque<Instant>,
        limit: RateLimit,
        now: Instant,
    ) -> Option<Duration> {
        while let Some(&front) = admitted.front() {
            if now.duration_since(front) >= limit.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < limit.max_calls as usize {
            return None;
        }
        admitted
            .front()
            .map(|&oldest| limit.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Admits the call if the budget allows it right now.
    ///
    /// Returns the admission instant, or the time to wait before trying
    /// again.
    pub fn try_admit(&self) -> core::result::Result<Instant, Duration> {
        let mut admitted = self.admitted.lock();
        let now = Instant::now();
        match Self::time_until_ready_locked(&mut admitted, self.limit, now) {
            None => {
                admitted.push_back(now);
                Ok(now)
            }
            Some(wait) => Err(wait),
        }
    }

    /// Blocks until the call fits in the budget, records it, and returns the
    /// admission instant.
    ///
    /// The window lock is never held while sleeping.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn admit(&self) -> Instant {
        loop {
            match self.try_admit() {
                Ok(at) => return at,
                Err(wait) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(?wait, "rate limit reached, sleeping");
                    // A zero wait means the oldest entry expires this instant;
                    // yield instead of spinning on the lock.
                    if wait.is_zero() {
                        thread::yield_now();
                    } else {
                        thread::sleep(wait);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier, Mutex as StdMutex};
    use std::thread::scope;

    #[test]
    fn rejects_empty_budgets() {
        assert!(RateLimiter::new(RateLimit::new(0, Duration::from_secs(1))).is_err());
        assert!(RateLimiter::new(RateLimit::new(5, Duration::ZERO)).is_err());
    }

    #[test]
    fn huge_budgets_allocate_lazily() {
        let limiter = RateLimiter::new(RateLimit::new(u32::MAX, Duration::from_secs(1))).unwrap();
        for _ in 0..(INITIAL_CAPACITY * 2) {
            assert!(limiter.try_admit().is_ok());
        }
        assert_eq!(limiter.limit().max_calls, u32::MAX);
    }

    #[test]
    fn try_admit_reports_wait_once_budget_is_spent() {
        let limiter = RateLimiter::new(RateLimit::new(2, Duration::from_secs(60))).unwrap();
        assert!(limiter.try_admit().is_ok());
        assert!(limiter.try_admit().is_ok());

        let wait = limiter.try_admit().unwrap_err();
        assert!(wait > Duration::from_secs(59));
        assert!(wait <= Duration::from_secs(60));
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(RateLimit::new(1, Duration::from_millis(50))).unwrap();
        let first = limiter.admit();
        let second = limiter.admit();
        assert!(second.duration_since(first) >= Duration::from_millis(50));
    }

    #[test]
    fn concurrent_callers_never_exceed_budget() {
        const THREADS: usize = 10;
        const CALLS: usize = 100;
        const MAX_CALLS: usize = 45;
        let window = Duration::from_secs(1);

        let limiter = Arc::new(RateLimiter::new(RateLimit::new(MAX_CALLS as u32, window)).unwrap());
        let admitted = Arc::new(StdMutex::new(Vec::with_capacity(CALLS)));
        let barrier = Arc::new(Barrier::new(THREADS));

        let start = Instant::now();
        scope(|s| {
            for _ in 0..THREADS {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                let barrier = Arc::clone(&barrier);
                s.spawn(move || {
                    barrier.wait();
                    for _ in 0..CALLS / THREADS {
                        let at = limiter.admit();
                        admitted.lock().unwrap().push(at);
                    }
                });
            }
        });
        let elapsed = start.elapsed();

        // 45 + 45 + 10: the last batch cannot start before two full windows.
        assert!(elapsed >= Duration::from_millis(1_950), "finished in {elapsed:?}");

        let mut admitted = admitted.lock().unwrap().clone();
        admitted.sort();
        assert_eq!(admitted.len(), CALLS);
        for (i, &at) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|&&later| later.duration_since(at) < window)
                .count();
            assert!(in_window <= MAX_CALLS, "{in_window} calls admitted within one window");
        }
    }
}
