/// Represents what an inbound handler did with a callback.
///
/// The remote side shares one callback channel between every request kind, so
/// the registry routinely sees ids it never issued (and the "no request"
/// sentinel). Those are not errors:
///
/// - [`Routing::Applied`] means the callback matched a pending request and
///   updated it.
/// - [`Routing::Unrouted`] means nothing here owns the id; the callback was
///   ignored.
///
/// # Example
///
/// ```
/// use reqline::Routing;
///
/// let routing = Routing::Unrouted;
/// if !routing.is_applied() {
///     // hand the callback to the next consumer
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// The callback was applied to a pending request.
    Applied,
    /// No pending request owns the callback's id.
    Unrouted,
}

impl Routing {
    /// Returns `true` for [`Routing::Applied`].
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}
