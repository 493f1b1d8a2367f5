#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    counter::{AtomicCounter, SequenceCounter},
    id::RequestId,
};

/// Issues generic correlation ids for outbound requests.
///
/// Ids are handed out in call order and never reused for the lifetime of the
/// allocator. Order ids are folded into the same sequence through
/// [`IdAllocator::reconcile`], so a correlation id can never collide with an
/// order id the venue already assigned.
#[derive(Debug, Default)]
pub struct IdAllocator<C = AtomicCounter>
where
    C: SequenceCounter,
{
    counter: C,
}

impl<C> IdAllocator<C>
where
    C: SequenceCounter,
{
    /// Creates an allocator whose first id is `baseline + 1`.
    pub fn new(baseline: i64) -> Self {
        Self {
            counter: C::with_baseline(baseline),
        }
    }

    /// Creates an allocator over an existing counter.
    pub fn from_counter(counter: C) -> Self {
        Self { counter }
    }

    /// Returns the next correlation id.
    ///
    /// # Example
    /// ```
    /// use reqline::IdAllocator;
    ///
    /// let ids: IdAllocator = IdAllocator::new(1);
    /// assert_eq!(ids.next_id().get(), 2);
    /// assert_eq!(ids.next_id().get(), 3);
    /// ```
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_id(&self) -> RequestId {
        RequestId::new_unchecked(self.counter.next())
    }

    /// Folds an externally assigned id into the sequence and returns the id
    /// to use: `max(external, last issued + 1)`.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn reconcile(&self, external: i64) -> i64 {
        self.counter.advance_past(external)
    }

    /// The most recently issued id.
    pub fn current(&self) -> i64 {
        self.counter.current()
    }
}
