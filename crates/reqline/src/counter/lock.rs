use core::cmp;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{counter::SequenceCounter, mutex::Mutex};

/// A lock-based [`SequenceCounter`].
///
/// The counter value lives behind a [`Mutex`], so every operation takes the
/// lock exactly once.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Fair access across threads
///
/// ## Recommended When
/// - Your target doesn't support 64-bit atomics
/// - Fair access across threads is important
///
/// ## See Also
/// - [`AtomicCounter`]
///
/// [`AtomicCounter`]: crate::counter::AtomicCounter
#[derive(Debug)]
pub struct LockCounter {
    state: Mutex<i64>,
}

impl LockCounter {
    /// Creates a counter whose first value is `baseline + 1`.
    pub fn new(baseline: i64) -> Self {
        Self {
            state: Mutex::new(baseline),
        }
    }
}

impl Default for LockCounter {
    fn default() -> Self {
        Self::new(crate::DEFAULT_ID_BASELINE)
    }
}

impl SequenceCounter for LockCounter {
    fn with_baseline(baseline: i64) -> Self {
        Self::new(baseline)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn next(&self) -> i64 {
        let mut value = self.state.lock();
        *value += 1;
        *value
    }

    fn current(&self) -> i64 {
        *self.state.lock()
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn advance_past(&self, floor: i64) -> i64 {
        let mut value = self.state.lock();
        *value = cmp::max(floor, *value + 1);
        *value
    }
}
