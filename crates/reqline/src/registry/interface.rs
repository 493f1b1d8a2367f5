use alloc::sync::Arc;
use core::{fmt, hash::Hash};

use crate::id::RequestId;

/// A caller-supplied value identifying what is being resolved.
///
/// Two descriptors that mean the same thing must produce equal keys; the key
/// is what requests are deduplicated and cached under.
///
/// # Example
///
/// ```
/// use reqline::Descriptor;
///
/// #[derive(Clone, Debug)]
/// struct Symbol(String);
///
/// impl Descriptor for Symbol {
///     type Key = String;
///
///     fn key(&self) -> String {
///         self.0.trim().to_ascii_uppercase()
///     }
/// }
///
/// assert_eq!(Symbol(" aapl".into()).key(), Symbol("AAPL".into()).key());
/// ```
pub trait Descriptor: Clone + fmt::Debug + Send + Sync + 'static {
    /// Canonical, hashable form of the descriptor.
    type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}

impl Descriptor for String {
    type Key = String;

    fn key(&self) -> String {
        self.clone()
    }
}

/// The outbound half of an entity lookup.
///
/// Fire-and-forget: a failure to send is reported later as an inbound error
/// for `correlation_id`, never by this call.
pub trait Outbound<D>: Send + Sync {
    fn send(&self, correlation_id: RequestId, descriptor: &D);
}

impl<D, T> Outbound<D> for Arc<T>
where
    T: Outbound<D> + ?Sized,
{
    fn send(&self, correlation_id: RequestId, descriptor: &D) {
        (**self).send(correlation_id, descriptor);
    }
}
