//! An in-process stand-in for the broker.
//!
//! Outbound calls are queued on a channel. A single reader thread plays both
//! the remote side and the client's callback thread: it answers each call
//! after a fixed latency and feeds the answers back into the session, the
//! same way a real reader thread would.

use core::time::Duration;
use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
        mpsc::{Receiver, Sender, channel},
    },
    thread::{self, JoinHandle},
};

use reqline::{Descriptor, NO_REQUEST_ID, OrderIdSource, Outbound, RequestId, Session};

/// Exchanges the loopback venue lists every symbol on, after the queried one.
const LISTINGS: [&str; 4] = ["NASDAQ", "NYSE", "ARCA", "BATS"];

pub type LoopbackSession = Session<ContractQuery, Contract, LoopbackClient>;

/// A possibly partial contract query: a symbol and an optional exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct ContractQuery {
    pub symbol: String,
    pub exchange: Option<String>,
}

impl ContractQuery {
    /// Parses `SYMBOL` or `SYMBOL@EXCHANGE`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('@') {
            Some((symbol, exchange)) => Self {
                symbol: symbol.trim().to_string(),
                exchange: Some(exchange.trim().to_string()),
            },
            None => Self {
                symbol: raw.trim().to_string(),
                exchange: None,
            },
        }
    }

    fn exchange_or_default(&self) -> &str {
        self.exchange.as_deref().unwrap_or("SMART")
    }
}

impl fmt::Debug for ContractQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.exchange_or_default())
    }
}

impl Descriptor for ContractQuery {
    type Key = String;

    fn key(&self) -> String {
        format!(
            "{}@{}",
            self.symbol.to_ascii_uppercase(),
            self.exchange_or_default().to_ascii_uppercase()
        )
    }
}

/// A fully qualified contract as the venue reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    pub con_id: i64,
    pub symbol: String,
    pub exchange: String,
}

impl Contract {
    /// The query that names exactly this contract.
    pub fn alias(&self) -> Option<String> {
        Some(
            ContractQuery {
                symbol: self.symbol.clone(),
                exchange: Some(self.exchange.clone()),
            }
            .key(),
        )
    }
}

/// An outbound call waiting for the venue to answer it.
#[derive(Debug)]
pub enum Call {
    Lookup(RequestId, ContractQuery),
    NextValidId,
}

/// Settings for the simulated venue.
#[derive(Clone, Debug)]
pub struct VenueConfig {
    /// Delay before each call is answered.
    pub latency: Duration,
    /// Rows returned per successful lookup.
    pub rows: usize,
    /// Pushed unsolicited when the reader starts.
    pub first_order_id: i64,
}

/// The outbound half handed to the session.
#[derive(Debug)]
pub struct LoopbackClient {
    calls: Sender<Call>,
    lookups: AtomicUsize,
    order_id_requests: AtomicUsize,
}

impl LoopbackClient {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn order_id_requests(&self) -> usize {
        self.order_id_requests.load(Ordering::Relaxed)
    }

    fn enqueue(&self, call: Call) {
        // A closed channel means the reader is gone; the waiter times out.
        if let Err(err) = self.calls.send(call) {
            tracing::warn!(call = ?err.0, "venue is no longer reading");
        }
    }
}

impl Outbound<ContractQuery> for LoopbackClient {
    fn send(&self, correlation_id: RequestId, descriptor: &ContractQuery) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.enqueue(Call::Lookup(correlation_id, descriptor.clone()));
    }
}

impl OrderIdSource for LoopbackClient {
    fn request_order_id(&self) {
        self.order_id_requests.fetch_add(1, Ordering::Relaxed);
        self.enqueue(Call::NextValidId);
    }
}

/// Creates the client and the receiving end the reader thread consumes.
pub fn connect() -> (LoopbackClient, Receiver<Call>) {
    let (calls, inbox) = channel();
    let client = LoopbackClient {
        calls,
        lookups: AtomicUsize::new(0),
        order_id_requests: AtomicUsize::new(0),
    };
    (client, inbox)
}

/// Starts the reader thread.
///
/// The thread holds the session weakly; it stops once the session (and with
/// it the sending half of the channel) is dropped.
pub fn spawn_reader(
    config: VenueConfig,
    session: &Arc<LoopbackSession>,
    inbox: Receiver<Call>,
) -> std::io::Result<JoinHandle<()>> {
    let session = Arc::downgrade(session);
    thread::Builder::new()
        .name("venue-reader".into())
        .spawn(move || read_loop(config, session, inbox))
}

fn read_loop(config: VenueConfig, weak: Weak<LoopbackSession>, inbox: Receiver<Call>) {
    let mut next_valid_id = config.first_order_id;

    if let Some(session) = weak.upgrade() {
        dispatch(&session, |s| s.deliver_order_id(next_valid_id));
        dispatch(&session, |s| {
            s.on_error(NO_REQUEST_ID, "Market data farm connection is OK:usfarm")
        });
    }

    while let Ok(call) = inbox.recv() {
        thread::sleep(config.latency);
        let Some(session) = weak.upgrade() else {
            break;
        };
        match call {
            Call::Lookup(id, query) => answer_lookup(&session, config.rows, id, &query),
            Call::NextValidId => {
                next_valid_id += 1;
                dispatch(&session, |s| s.deliver_order_id(next_valid_id));
            }
        }
    }
    tracing::debug!("venue reader stopped");
}

fn answer_lookup(session: &LoopbackSession, rows: usize, id: RequestId, query: &ContractQuery) {
    let id = id.get();
    if query.symbol.is_empty() || query.symbol.eq_ignore_ascii_case("unknown") {
        dispatch(session, |s| {
            s.on_error(id, "No security definition has been found for the request")
        });
        return;
    }

    let con_id = query
        .symbol
        .bytes()
        .fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(i64::from(b)))
        .rem_euclid(1_000_000);
    let symbol = query.symbol.to_ascii_uppercase();
    let exchanges = core::iter::once(query.exchange_or_default().to_ascii_uppercase())
        .chain(LISTINGS.iter().map(|e| e.to_string()));

    for exchange in exchanges.take(rows) {
        let contract = Contract {
            con_id,
            symbol: symbol.clone(),
            exchange,
        };
        dispatch(session, |s| s.on_result(id, contract));
    }
    dispatch(session, |s| s.on_end(id));
}

/// Hands one callback to the session and logs anything unexpected.
fn dispatch(
    session: &LoopbackSession,
    callback: impl FnOnce(&LoopbackSession) -> reqline::Result<reqline::Routing>,
) {
    match callback(session) {
        Ok(routing) if routing.is_applied() => {}
        Ok(_) => tracing::debug!("callback not routed to a pending request"),
        Err(err) => tracing::error!(%err, "callback rejected"),
    }
}
