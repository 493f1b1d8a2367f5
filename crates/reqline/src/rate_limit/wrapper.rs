use alloc::sync::Arc;

use crate::{
    id::RequestId,
    order_id::OrderIdSource,
    rate_limit::RateLimiter,
    registry::Outbound,
};

/// Wraps an outbound collaborator so every call first passes through a shared
/// [`RateLimiter`].
///
/// Cloning shares both the collaborator and the limiter, so descriptor
/// lookups and order-id requests draw from one budget.
#[derive(Debug)]
pub struct RateLimited<T> {
    inner: T,
    limiter: Option<Arc<RateLimiter>>,
}

impl<T> RateLimited<T> {
    pub fn new(inner: T, limiter: Arc<RateLimiter>) -> Self {
        Self {
            inner,
            limiter: Some(limiter),
        }
    }

    /// Passes every call straight through.
    pub fn unlimited(inner: T) -> Self {
        Self {
            inner,
            limiter: None,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    fn admit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.admit();
        }
    }
}

impl<T: Clone> Clone for RateLimited<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<D, T> Outbound<D> for RateLimited<T>
where
    T: Outbound<D>,
{
    fn send(&self, correlation_id: RequestId, descriptor: &D) {
        self.admit();
        self.inner.send(correlation_id, descriptor);
    }
}

impl<T> OrderIdSource for RateLimited<T>
where
    T: OrderIdSource,
{
    fn request_order_id(&self) {
        self.admit();
        self.inner.request_order_id();
    }
}
