use alloc::sync::Arc;
use core::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    allocator::IdAllocator,
    config::SessionConfig,
    error::Result,
    id::RequestId,
    order_id::{OrderIdCoordinator, OrderIdSource},
    rate_limit::{RateLimited, RateLimiter},
    registry::{Descriptor, EntityRegistry, Outbound},
    status::Routing,
};

type Gate<C> = RateLimited<Arc<C>>;

/// Everything one connection needs to correlate requests and hand out ids.
///
/// A session wires a single collaborator (the venue client) into a shared id
/// allocator, one rate budget, an entity registry and an order-id
/// coordinator. Application threads call the blocking/non-blocking methods;
/// the reader thread feeds callbacks into the `on_*` and
/// [`Session::deliver_order_id`] methods.
///
/// Generic request ids and order ids come from the same sequence, so an id
/// handed out here never collides with an order id already in use.
///
/// Dropping the session stops the order-id re-issue loop.
pub struct Session<D, R, C>
where
    D: Descriptor,
    C: Outbound<D> + OrderIdSource + 'static,
{
    config: SessionConfig,
    ids: Arc<IdAllocator>,
    collaborator: Arc<C>,
    registry: EntityRegistry<D, R, Gate<C>>,
    order_ids: OrderIdCoordinator<Gate<C>>,
}

impl<D, R, C> Session<D, R, C>
where
    D: Descriptor,
    R: Clone + Send + Sync + 'static,
    C: Outbound<D> + OrderIdSource + 'static,
{
    /// Validates `config` and builds a session around `collaborator`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// configuration is rejected by [`SessionConfig::validate`].
    pub fn new(config: SessionConfig, collaborator: C) -> Result<Self> {
        config.validate()?;

        let ids = Arc::new(IdAllocator::new(config.id_baseline));
        let collaborator = Arc::new(collaborator);
        let gate = match config.rate_limit {
            Some(limit) => RateLimited::new(
                Arc::clone(&collaborator),
                Arc::new(RateLimiter::new(limit)?),
            ),
            None => RateLimited::unlimited(Arc::clone(&collaborator)),
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            strategy = %config.order_id_strategy,
            rate_limit = ?config.rate_limit,
            baseline = config.id_baseline,
            "session created"
        );

        Ok(Self {
            registry: EntityRegistry::new(Arc::clone(&ids), gate.clone()),
            order_ids: OrderIdCoordinator::with_reissue_interval(
                config.order_id_strategy,
                config.reissue_interval,
                gate,
            ),
            ids,
            collaborator,
            config,
        })
    }

    /// Installs an alias function on the entity registry.
    ///
    /// See [`EntityRegistry::with_alias`].
    pub fn with_alias<F>(mut self, alias: F) -> Self
    where
        F: Fn(&R) -> Option<D::Key> + Send + Sync + 'static,
    {
        self.registry = self.registry.with_alias(alias);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn collaborator(&self) -> &Arc<C> {
        &self.collaborator
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub fn registry(&self) -> &EntityRegistry<D, R, Gate<C>> {
        &self.registry
    }

    pub fn order_ids(&self) -> &OrderIdCoordinator<Gate<C>> {
        &self.order_ids
    }

    /// The shared outbound budget, if admission control is enabled.
    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.registry.outbound().limiter()
    }

    /// Resolves `descriptor` within the configured request timeout.
    ///
    /// # Errors
    /// See [`EntityRegistry::resolve_blocking`].
    pub fn resolve_blocking(&self, descriptor: &D) -> Result<Vec<R>> {
        self.registry
            .resolve_blocking(descriptor, self.config.request_timeout)
    }

    /// Resolves `descriptor`, waiting at most `timeout`.
    ///
    /// # Errors
    /// See [`EntityRegistry::resolve_blocking`].
    pub fn resolve_blocking_timeout(&self, descriptor: &D, timeout: Duration) -> Result<Vec<R>> {
        self.registry.resolve_blocking(descriptor, timeout)
    }

    /// Starts resolving `descriptor` without waiting for the answer.
    ///
    /// Never waits on the venue, but does wait for a rate-limit slot when the
    /// outbound budget is spent.
    pub fn resolve_nonblocking(&self, descriptor: &D) {
        self.registry.resolve_nonblocking(descriptor);
    }

    /// A fresh correlation id for calls made outside the registry.
    pub fn next_request_id(&self) -> RequestId {
        self.ids.next_id()
    }

    /// Takes the next order id, waiting at most the configured request
    /// timeout.
    ///
    /// # Errors
    /// Returns [`Error::Timeout`](crate::Error::Timeout) if the venue did
    /// not deliver a value in time.
    pub fn next_order_id(&self) -> Result<i64> {
        self.next_order_id_timeout(self.config.request_timeout)
    }

    /// Takes the next order id, waiting at most `timeout`.
    ///
    /// The delivered value is reconciled with the shared id sequence: the
    /// result is at least one above any id this session has handed out, and
    /// never below a value the venue delivered before the call.
    ///
    /// # Errors
    /// Returns [`Error::Timeout`](crate::Error::Timeout) if the venue did
    /// not deliver a value in time.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn next_order_id_timeout(&self, timeout: Duration) -> Result<i64> {
        let floor = self.order_ids.last_known();
        let delivered = self.order_ids.request().get(timeout)?;
        let order_id = self
            .ids
            .reconcile(floor.map_or(delivered, |floor| delivered.max(floor)));
        #[cfg(feature = "tracing")]
        if order_id != delivered {
            tracing::debug!(delivered, order_id, "order id lifted above issued ids");
        }
        Ok(order_id)
    }

    /// Inbound: one result row for `correlation_id`.
    ///
    /// # Errors
    /// See [`EntityRegistry::on_result`].
    pub fn on_result(&self, correlation_id: i64, result: R) -> Result<Routing> {
        self.registry.on_result(correlation_id, result)
    }

    /// Inbound: a terminal error for `correlation_id`.
    ///
    /// The error channel is shared by every request kind, so errors for ids
    /// the registry does not own come back [`Routing::Unrouted`] for the
    /// caller to dispatch elsewhere.
    ///
    /// # Errors
    /// See [`EntityRegistry::on_error`].
    pub fn on_error(&self, correlation_id: i64, message: impl Into<String>) -> Result<Routing> {
        self.registry.on_error(correlation_id, message)
    }

    /// Inbound: end of results for `correlation_id`.
    ///
    /// # Errors
    /// See [`EntityRegistry::on_end`].
    pub fn on_end(&self, correlation_id: i64) -> Result<Routing> {
        self.registry.on_end(correlation_id)
    }

    /// Inbound: a next-valid-order-id value, solicited or not.
    ///
    /// # Errors
    /// See [`OrderIdCoordinator::deliver`].
    pub fn deliver_order_id(&self, value: i64) -> Result<Routing> {
        self.order_ids.deliver(value)
    }
}

impl<D, R, C> core::fmt::Debug for Session<D, R, C>
where
    D: Descriptor,
    C: Outbound<D> + OrderIdSource + 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}
