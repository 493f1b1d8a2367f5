use alloc::sync::{Arc, Weak};
use core::{cmp, time::Duration};
use std::{collections::VecDeque, thread};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    mutex::Mutex,
    order_id::{OrderIdSource, OrderIdStrategy},
    slot::Slot,
    status::Routing,
};

/// Default pause between re-issued order-id requests while tickets are
/// outstanding.
pub const DEFAULT_REISSUE_INTERVAL: Duration = Duration::from_millis(10);

/// Largest order id the venue can deliver. Its ids are 32-bit.
pub const MAX_ORDER_ID: i64 = i32::MAX as i64;

#[derive(Debug)]
struct TicketCell {
    position: u64,
    value: Slot<i64>,
}

#[derive(Debug, Default)]
struct SequenceState {
    last_known: Option<i64>,
    pending: VecDeque<Arc<TicketCell>>,
    next_position: u64,
    reissuing: bool,
}

impl SequenceState {
    fn enqueue(&mut self) -> Arc<TicketCell> {
        let cell = Arc::new(TicketCell {
            position: self.next_position,
            value: Slot::new(),
        });
        self.next_position += 1;
        self.pending.push_back(Arc::clone(&cell));
        cell
    }

    /// Fulfills every queued ticket from the local sequence. Only valid once
    /// a value is known.
    fn drain_locally(&mut self) {
        while let Some(last) = self.last_known {
            let Some(cell) = self.pending.pop_front() else {
                break;
            };
            let value = last + 1;
            self.last_known = Some(value);
            cell.value.fill(value);
        }
    }
}

#[derive(Debug)]
struct Inner<S> {
    state: Mutex<SequenceState>,
    strategy: OrderIdStrategy,
    reissue_interval: Option<Duration>,
    source: S,
}

/// Hands out order ids by matching tickets, in creation order, against values
/// the venue delivers asynchronously.
///
/// The coordinator reconciles two sources of truth: the values pushed by the
/// venue (solicited or not) and, under [`OrderIdStrategy::Local`], its own
/// increments. The last known value only ever moves forward.
///
/// ## Timeouts
///
/// The venue has no way to cancel an order-id request. A ticket that times
/// out is dropped from the queue, but its request is still in flight. When
/// the answer eventually arrives it fulfills the *next* waiting ticket, or is
/// only recorded as the last known value if nobody is waiting. Callers that
/// time out and retry may therefore receive an id that was requested on
/// someone else's behalf.
#[derive(Debug)]
pub struct OrderIdCoordinator<S>
where
    S: OrderIdSource + 'static,
{
    inner: Arc<Inner<S>>,
}

impl<S> OrderIdCoordinator<S>
where
    S: OrderIdSource + 'static,
{
    /// Creates a coordinator with the default re-issue interval.
    pub fn new(strategy: OrderIdStrategy, source: S) -> Self {
        Self::with_reissue_interval(strategy, Some(DEFAULT_REISSUE_INTERVAL), source)
    }

    /// Creates a coordinator. `reissue_interval = None` disables the
    /// background re-request loop under [`OrderIdStrategy::Remote`], leaving
    /// exactly one outbound request per ticket.
    pub fn with_reissue_interval(
        strategy: OrderIdStrategy,
        reissue_interval: Option<Duration>,
        source: S,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SequenceState::default()),
                strategy,
                reissue_interval,
                source,
            }),
        }
    }

    pub fn strategy(&self) -> OrderIdStrategy {
        self.inner.strategy
    }

    /// The highest value ever delivered or issued locally.
    pub fn last_known(&self) -> Option<i64> {
        self.inner.state.lock().last_known
    }

    /// Number of tickets still waiting for a value.
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Creates a ticket for the next order id.
    ///
    /// Under [`OrderIdStrategy::Remote`] this sends an order-id request and
    /// makes sure the re-issue loop is running. Under
    /// [`OrderIdStrategy::Local`] the ticket is fulfilled before it is
    /// returned, unless no value has ever been delivered, in which case the
    /// venue is asked for a starting value.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn request(&self) -> Ticket<S> {
        let mut state = self.inner.state.lock();

        let (cell, solicit) = match (self.inner.strategy, state.last_known) {
            (OrderIdStrategy::Local, Some(_)) => {
                let cell = state.enqueue();
                state.drain_locally();
                (cell, false)
            }
            (OrderIdStrategy::Local, None) => {
                let cell = state.enqueue();
                // One solicitation seeds every ticket queued behind it.
                let first = state.pending.len() == 1;
                (cell, first)
            }
            (OrderIdStrategy::Remote, _) => (state.enqueue(), true),
        };

        let spawn_loop = match self.inner.reissue_interval {
            Some(_) if solicit && !state.reissuing => {
                state.reissuing = true;
                true
            }
            _ => false,
        };
        drop(state);

        if solicit {
            #[cfg(feature = "tracing")]
            tracing::debug!(position = cell.position, "requesting order id");
            self.inner.source.request_order_id();
        }
        if spawn_loop {
            self.spawn_reissue_loop();
        }

        Ticket {
            cell,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Records a value delivered by the venue.
    ///
    /// The last known value advances to `max(current, value)`. If a ticket is
    /// waiting, the oldest one is fulfilled with `value`. Otherwise the value
    /// only updates the sequence (startup values land here).
    ///
    /// # Errors
    /// Returns [`Error::ContractViolation`] for negative values and values
    /// above [`MAX_ORDER_ID`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn deliver(&self, value: i64) -> Result<Routing> {
        if value < 0 {
            return Err(Error::violation(format!("negative order id {value} delivered")));
        }
        if value > MAX_ORDER_ID {
            return Err(Error::violation(format!(
                "order id {value} delivered above {MAX_ORDER_ID}"
            )));
        }

        let mut state = self.inner.state.lock();
        state.last_known = Some(state.last_known.map_or(value, |last| cmp::max(last, value)));

        let Some(cell) = state.pending.pop_front() else {
            #[cfg(feature = "tracing")]
            tracing::debug!(value, "no ticket waiting, order id recorded");
            return Ok(Routing::Unrouted);
        };
        cell.value.fill(value);
        #[cfg(feature = "tracing")]
        tracing::debug!(value, position = cell.position, "order id ticket fulfilled");

        if self.inner.strategy == OrderIdStrategy::Local {
            state.drain_locally();
        }
        Ok(Routing::Applied)
    }

    fn spawn_reissue_loop(&self) {
        let Some(interval) = self.inner.reissue_interval else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let spawned = thread::Builder::new()
            .name("order-id-reissue".into())
            .spawn(move || reissue_loop(weak, interval));

        if let Err(_e) = spawned {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "failed to spawn order id re-issue loop");
            self.inner.state.lock().reissuing = false;
        }
    }
}

/// Re-sends the order-id request every `interval` while any ticket is
/// pending. Holds only a weak reference so dropping the coordinator ends it.
fn reissue_loop<S>(weak: Weak<Inner<S>>, interval: Duration)
where
    S: OrderIdSource,
{
    loop {
        thread::sleep(interval);

        let Some(inner) = weak.upgrade() else {
            break;
        };

        {
            let mut state = inner.state.lock();
            if state.pending.is_empty() {
                state.reissuing = false;
                break;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("re-issuing order id request");
        inner.source.request_order_id();
    }
}

/// An outstanding request for the next order id.
///
/// Consumed by [`Ticket::get`]. Dropping an unfulfilled ticket withdraws it
/// from the queue.
#[derive(Debug)]
#[must_use]
pub struct Ticket<S>
where
    S: OrderIdSource + 'static,
{
    cell: Arc<TicketCell>,
    inner: Arc<Inner<S>>,
}

impl<S> Ticket<S>
where
    S: OrderIdSource + 'static,
{
    /// Creation order of this ticket within its coordinator.
    pub fn position(&self) -> u64 {
        self.cell.position
    }

    /// The value, if the ticket has already been fulfilled.
    pub fn try_get(&self) -> Option<i64> {
        self.cell.value.peek()
    }

    /// Blocks until the ticket is fulfilled or `timeout` elapses.
    ///
    /// # Errors
    /// Returns [`Error::Timeout`] if no value arrived in time. The ticket is
    /// withdrawn from the queue, but the outbound request is not cancelled;
    /// see [`OrderIdCoordinator`] for what happens to the late value.
    pub fn get(self, timeout: Duration) -> Result<i64> {
        if let Some(value) = self.cell.value.wait_timeout(timeout) {
            return Ok(value);
        }
        if let Some(value) = self.withdraw() {
            return Ok(value);
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            position = self.cell.position,
            ?timeout,
            "order id ticket timed out, request left in flight"
        );
        Err(Error::timeout("order id", timeout))
    }

    /// Removes the ticket from the queue unless it was fulfilled meanwhile.
    fn withdraw(&self) -> Option<i64> {
        let mut state = self.inner.state.lock();
        // `deliver` fills under this lock, so this settles any race.
        if let Some(value) = self.cell.value.peek() {
            return Some(value);
        }
        state
            .pending
            .retain(|queued| !Arc::ptr_eq(queued, &self.cell));
        None
    }
}

/// An abandoned ticket must not consume a later delivery.
impl<S> Drop for Ticket<S>
where
    S: OrderIdSource + 'static,
{
    fn drop(&mut self) {
        let _ = self.withdraw();
    }
}
