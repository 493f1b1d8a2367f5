use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::time::Duration;
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    allocator::IdAllocator,
    counter::{AtomicCounter, SequenceCounter},
    error::{Error, Result},
    id::RequestId,
    mutex::{Mutex, MutexGuard},
    registry::{CacheEntry, Descriptor, Outbound, Outcome},
    slot::Slot,
    status::Routing,
};

type Completion<D, R> = Arc<Slot<Arc<CacheEntry<D, R>>>>;
type AliasFn<D, R> = Box<dyn Fn(&R) -> Option<<D as Descriptor>::Key> + Send + Sync>;

/// A request that has been sent and not yet closed.
struct PendingRequest<D: Descriptor, R> {
    descriptor: D,
    key: D::Key,
    results: Vec<R>,
    completion: Completion<D, R>,
}

struct RegistryState<D: Descriptor, R> {
    pending: HashMap<RequestId, PendingRequest<D, R>>,
    pending_by_key: HashMap<D::Key, RequestId>,
    cache: HashMap<D::Key, Arc<CacheEntry<D, R>>>,
}

impl<D: Descriptor, R> Default for RegistryState<D, R> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            pending_by_key: HashMap::new(),
            cache: HashMap::new(),
        }
    }
}

enum Registration<D, R> {
    Cached(Arc<CacheEntry<D, R>>),
    Waiting(Completion<D, R>),
}

/// Deduplicating, caching resolver for descriptor lookups.
///
/// However many threads ask for the same descriptor, and whenever they ask,
/// at most one outbound call is ever made for its key. Callers either get the
/// cached answer immediately or share the wait on the single in-flight
/// request. Results are delivered by the reader thread through
/// [`EntityRegistry::on_result`], [`EntityRegistry::on_error`] and
/// [`EntityRegistry::on_end`].
///
/// Closed entries are never evicted.
pub struct EntityRegistry<D, R, O, C = AtomicCounter>
where
    D: Descriptor,
    C: SequenceCounter,
{
    state: Mutex<RegistryState<D, R>>,
    ids: Arc<IdAllocator<C>>,
    outbound: O,
    alias: Option<AliasFn<D, R>>,
    kind: &'static str,
}

impl<D, R, O, C> EntityRegistry<D, R, O, C>
where
    D: Descriptor,
    R: Clone + Send + Sync + 'static,
    O: Outbound<D>,
    C: SequenceCounter,
{
    /// Creates a registry that draws correlation ids from `ids` and sends
    /// through `outbound`.
    pub fn new(ids: Arc<IdAllocator<C>>, outbound: O) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            ids,
            outbound,
            alias: None,
            kind: "EntityLookup",
        }
    }

    /// Also caches each closed entry under the key each result maps to.
    ///
    /// A lookup by a partial descriptor usually returns fully-qualified
    /// results; with an alias function, a later lookup by the
    /// fully-qualified descriptor is a cache hit. Keys that are already
    /// cached or pending are left alone.
    pub fn with_alias<F>(mut self, alias: F) -> Self
    where
        F: Fn(&R) -> Option<D::Key> + Send + Sync + 'static,
    {
        self.alias = Some(Box::new(alias));
        self
    }

    /// Request kind recorded in the request log.
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    pub fn outbound(&self) -> &O {
        &self.outbound
    }

    /// Starts resolving `descriptor` without waiting for the answer.
    ///
    /// Does nothing if the descriptor is cached or already in flight.
    ///
    /// The send itself runs on the calling thread, so a rate-limited
    /// outbound may hold the caller for up to one window before the request
    /// goes out. The registry lock is not held meanwhile.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(kind = self.kind)))]
    pub fn resolve_nonblocking(&self, descriptor: &D) {
        let _ = self.register(descriptor);
    }

    /// Resolves `descriptor`, blocking until its entry closes or `timeout`
    /// elapses.
    ///
    /// # Errors
    /// - [`Error::Remote`] if the venue failed the lookup (now or earlier).
    /// - [`Error::Timeout`] if the entry did not close in time. The request
    ///   stays registered and a late answer is still cached.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(kind = self.kind)))]
    pub fn resolve_blocking(&self, descriptor: &D, timeout: Duration) -> Result<Vec<R>> {
        let completion = match self.register(descriptor) {
            Registration::Cached(entry) => return entry.to_result(),
            Registration::Waiting(completion) => completion,
        };

        match completion.wait_timeout(timeout) {
            Some(entry) => entry.to_result(),
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!(?descriptor, ?timeout, "lookup timed out, request left pending");
                Err(Error::timeout("entity lookup", timeout))
            }
        }
    }

    /// Finds the cached entry for `descriptor` or joins/starts its request.
    fn register(&self, descriptor: &D) -> Registration<D, R> {
        let key = descriptor.key();
        let mut state = self.state.lock();

        if let Some(entry) = state.cache.get(&key) {
            return Registration::Cached(Arc::clone(entry));
        }
        let in_flight = state
            .pending_by_key
            .get(&key)
            .and_then(|id| state.pending.get(id));
        if let Some(pending) = in_flight {
            #[cfg(feature = "tracing")]
            tracing::debug!(?key, "joining in-flight lookup");
            return Registration::Waiting(Arc::clone(&pending.completion));
        }

        let correlation_id = self.ids.next_id();
        let completion = Arc::new(Slot::new());
        state.pending_by_key.insert(key.clone(), correlation_id);
        state.pending.insert(
            correlation_id,
            PendingRequest {
                descriptor: descriptor.clone(),
                key,
                results: Vec::new(),
                completion: Arc::clone(&completion),
            },
        );
        drop(state);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            correlation_id = correlation_id.get(),
            kind = self.kind,
            ?descriptor,
            "request"
        );
        // Sent outside the lock: the rate limiter may sleep here and the
        // reader thread must still be able to deliver.
        self.outbound.send(correlation_id, descriptor);

        Registration::Waiting(completion)
    }

    /// Appends one result to the pending request for `correlation_id`.
    ///
    /// # Errors
    /// Returns [`Error::ContractViolation`] for negative ids.
    pub fn on_result(&self, correlation_id: i64, result: R) -> Result<Routing> {
        let id = RequestId::from_raw(correlation_id)?;
        let mut state = self.state.lock();
        let Some(pending) = state.pending.get_mut(&id) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(correlation_id, "result for unknown request ignored");
            return Ok(Routing::Unrouted);
        };
        pending.results.push(result);
        Ok(Routing::Applied)
    }

    /// Fails the pending request for `correlation_id` and wakes its waiters.
    ///
    /// Errors for ids this registry never issued, including the "no request"
    /// sentinel, are ignored.
    ///
    /// # Errors
    /// Returns [`Error::ContractViolation`] for negative ids, or if results
    /// were already recorded for the request (which is left untouched).
    pub fn on_error(&self, correlation_id: i64, message: impl Into<String>) -> Result<Routing> {
        let id = RequestId::from_raw(correlation_id)?;
        let message = message.into();
        let mut state = self.state.lock();

        let Some(pending) = state.pending.get(&id) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(correlation_id, %message, "error for unknown request ignored");
            return Ok(Routing::Unrouted);
        };
        if !pending.results.is_empty() {
            return Err(Error::violation(format!(
                "error `{message}` for request {id} ({:?}) after {} result(s)",
                pending.descriptor,
                pending.results.len()
            )));
        }

        let Some(pending) = state.pending.remove(&id) else {
            return Ok(Routing::Unrouted);
        };
        self.close(state, id, pending, |_| Outcome::Failed(message));
        Ok(Routing::Applied)
    }

    /// Closes the pending request for `correlation_id` with whatever results
    /// were appended (possibly none) and wakes its waiters.
    ///
    /// # Errors
    /// Returns [`Error::ContractViolation`] for negative ids.
    pub fn on_end(&self, correlation_id: i64) -> Result<Routing> {
        let id = RequestId::from_raw(correlation_id)?;
        let mut state = self.state.lock();
        let Some(pending) = state.pending.remove(&id) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(correlation_id, "end for unknown request ignored");
            return Ok(Routing::Unrouted);
        };
        self.close(state, id, pending, Outcome::Resolved);
        Ok(Routing::Applied)
    }

    /// Moves a finished request into the cache and releases its waiters.
    fn close(
        &self,
        mut state: MutexGuard<'_, RegistryState<D, R>>,
        id: RequestId,
        pending: PendingRequest<D, R>,
        outcome: impl FnOnce(Vec<R>) -> Outcome<R>,
    ) {
        let PendingRequest {
            descriptor,
            key,
            results,
            completion,
        } = pending;

        let entry = Arc::new(CacheEntry::new(descriptor, id, outcome(results)));
        state.pending_by_key.remove(&key);

        if let Some(alias) = &self.alias {
            // Each alias is cached with only the rows it names.
            let mut aliased: Vec<(D::Key, Vec<R>)> = Vec::new();
            for result in entry.results() {
                let Some(alias_key) = alias(result) else {
                    continue;
                };
                if alias_key == key
                    || state.cache.contains_key(&alias_key)
                    || state.pending_by_key.contains_key(&alias_key)
                {
                    continue;
                }
                match aliased.iter_mut().find(|(k, _)| *k == alias_key) {
                    Some((_, rows)) => rows.push(result.clone()),
                    None => aliased.push((alias_key, vec![result.clone()])),
                }
            }
            for (alias_key, rows) in aliased {
                let alias_entry =
                    CacheEntry::new(entry.descriptor().clone(), id, Outcome::Resolved(rows));
                state.cache.insert(alias_key, Arc::new(alias_entry));
            }
        }
        state.cache.insert(key, Arc::clone(&entry));
        drop(state);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            correlation_id = id.get(),
            results = entry.results().len(),
            failed = entry.error().is_some(),
            "lookup closed"
        );
        completion.fill(entry);
    }

    /// The cached entry for `descriptor`, if its lookup has closed.
    pub fn lookup(&self, descriptor: &D) -> Option<Arc<CacheEntry<D, R>>> {
        self.state.lock().cache.get(&descriptor.key()).cloned()
    }

    /// Returns `true` while a lookup for `descriptor` is in flight.
    pub fn is_pending(&self, descriptor: &D) -> bool {
        self.state
            .lock()
            .pending_by_key
            .contains_key(&descriptor.key())
    }

    /// Number of requests in flight.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of cached keys, aliases included.
    pub fn cached_len(&self) -> usize {
        self.state.lock().cache.len()
    }
}
