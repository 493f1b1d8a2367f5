/// A minimal interface for thread-safe, strictly increasing integer sources.
///
/// Every implementation starts *above* a reserved baseline: a counter built
/// with baseline `1` hands out `2, 3, 4, ...`. Values are never reused for the
/// lifetime of the counter.
pub trait SequenceCounter: Send + Sync {
    /// Creates a counter whose first value is `baseline + 1`.
    fn with_baseline(baseline: i64) -> Self
    where
        Self: Sized;

    /// Returns the next value. Never blocks beyond the counter's own
    /// protection and never fails.
    fn next(&self) -> i64;

    /// Returns the most recently issued value (or the baseline if nothing has
    /// been issued yet).
    fn current(&self) -> i64;

    /// Issues `max(floor, current + 1)` and stores it as the current value.
    ///
    /// This is how an externally supplied identifier is folded into the
    /// sequence: the returned value is unique, at least `floor`, and every
    /// later [`Self::next`] is strictly greater.
    fn advance_past(&self, floor: i64) -> i64;
}
