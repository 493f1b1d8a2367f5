use core::cmp;

use portable_atomic::{AtomicI64, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::counter::SequenceCounter;

/// A lock-free [`SequenceCounter`] backed by an [`AtomicI64`].
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Never blocks
///
/// ## Recommended When
/// - Many threads allocate correlation ids concurrently
/// - You want the lowest possible latency under contention
///
/// ## See Also
/// - [`LockCounter`]
///
/// [`LockCounter`]: crate::counter::LockCounter
#[derive(Debug)]
pub struct AtomicCounter {
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<AtomicI64>,
    #[cfg(not(feature = "cache-padded"))]
    state: AtomicI64,
}

impl AtomicCounter {
    /// Creates a counter whose first value is `baseline + 1`.
    ///
    /// # Example
    /// ```
    /// use reqline::{AtomicCounter, SequenceCounter};
    ///
    /// let counter = AtomicCounter::new(1);
    /// assert_eq!(counter.next(), 2);
    /// assert_eq!(counter.advance_past(10), 10);
    /// assert_eq!(counter.next(), 11);
    /// ```
    pub fn new(baseline: i64) -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(AtomicI64::new(baseline)),
            #[cfg(not(feature = "cache-padded"))]
            state: AtomicI64::new(baseline),
        }
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(crate::DEFAULT_ID_BASELINE)
    }
}

impl SequenceCounter for AtomicCounter {
    fn with_baseline(baseline: i64) -> Self {
        Self::new(baseline)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn next(&self) -> i64 {
        self.state.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn current(&self) -> i64 {
        self.state.load(Ordering::Acquire)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn advance_past(&self, floor: i64) -> i64 {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let issued = cmp::max(floor, current + 1);
            match self.state.compare_exchange_weak(
                current,
                issued,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return issued,
                Err(actual) => current = actual,
            }
        }
    }
}
