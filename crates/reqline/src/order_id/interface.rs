use alloc::sync::Arc;

/// The outbound half of order-id allocation: ask the venue for the next valid
/// order id.
///
/// Fire-and-forget. The answer (if any) arrives later on the reader thread
/// and is handed to [`OrderIdCoordinator::deliver`].
///
/// [`OrderIdCoordinator::deliver`]: crate::order_id::OrderIdCoordinator::deliver
pub trait OrderIdSource: Send + Sync {
    fn request_order_id(&self);
}

impl<T> OrderIdSource for Arc<T>
where
    T: OrderIdSource + ?Sized,
{
    fn request_order_id(&self) {
        (**self).request_order_id();
    }
}
