use core::time::Duration;
use std::sync::{Arc, Barrier};
use std::thread::{self, scope};
use std::time::Instant;

use crate::{
    Descriptor, EntityRegistry, Error, IdAllocator, NO_REQUEST_ID, Outbound, RequestId, Routing,
    mutex::Mutex,
};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Query {
    symbol: String,
    exchange: String,
}

impl Query {
    fn new(symbol: &str, exchange: &str) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
        }
    }
}

impl Descriptor for Query {
    type Key = String;

    fn key(&self) -> String {
        format!(
            "{}@{}",
            self.symbol.trim().to_ascii_uppercase(),
            self.exchange.trim().to_ascii_uppercase()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Contract {
    con_id: i64,
    symbol: &'static str,
    exchange: &'static str,
}

const AAPL_SMART: Contract = Contract {
    con_id: 265598,
    symbol: "AAPL",
    exchange: "SMART",
};
const AAPL_NASDAQ: Contract = Contract {
    con_id: 265598,
    symbol: "AAPL",
    exchange: "NASDAQ",
};

#[derive(Debug, Default)]
struct RecordingOutbound {
    sent: Mutex<Vec<(RequestId, Query)>>,
}

impl RecordingOutbound {
    fn count(&self) -> usize {
        self.sent.lock().len()
    }

    fn id_of(&self, index: usize) -> i64 {
        self.sent.lock()[index].0.get()
    }

    fn wait_for_sends(&self, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.count() < expected {
            assert!(Instant::now() < deadline, "request never sent");
            thread::yield_now();
        }
    }
}

impl Outbound<Query> for RecordingOutbound {
    fn send(&self, correlation_id: RequestId, descriptor: &Query) {
        self.sent.lock().push((correlation_id, descriptor.clone()));
    }
}

type TestRegistry = EntityRegistry<Query, Contract, Arc<RecordingOutbound>>;

fn registry() -> TestRegistry {
    EntityRegistry::new(
        Arc::new(IdAllocator::new(1)),
        Arc::new(RecordingOutbound::default()),
    )
}

#[test]
fn concurrent_callers_share_one_request() {
    let registry = registry();
    let aapl = Query::new("AAPL", "SMART");
    let timeout = Duration::from_secs(5);

    let results = scope(|s| {
        let handles: Vec<_> = (0..3)
            .map(|_| s.spawn(|| registry.resolve_blocking(&aapl, timeout)))
            .collect();

        registry.outbound().wait_for_sends(1);
        thread::sleep(Duration::from_millis(100));
        let id = registry.outbound().id_of(0);
        assert_eq!(registry.on_result(id, AAPL_SMART), Ok(Routing::Applied));
        assert_eq!(registry.on_result(id, AAPL_NASDAQ), Ok(Routing::Applied));
        assert_eq!(registry.on_end(id), Ok(Routing::Applied));

        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    for result in results {
        assert_eq!(result, Ok(vec![AAPL_SMART, AAPL_NASDAQ]));
    }
    assert_eq!(registry.outbound().count(), 1);

    // Later callers are served from the cache without a new request.
    let start = Instant::now();
    assert_eq!(
        registry.resolve_blocking(&Query::new("aapl", "smart"), Duration::ZERO),
        Ok(vec![AAPL_SMART, AAPL_NASDAQ])
    );
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(registry.outbound().count(), 1);
    assert_eq!(registry.pending_len(), 0);
}

#[test]
fn simultaneous_first_callers_send_once() {
    const THREADS: usize = 16;
    let registry = registry();
    let barrier = Barrier::new(THREADS);
    let msft = Query::new("MSFT", "SMART");

    scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    registry.resolve_blocking(&msft, Duration::from_secs(5))
                })
            })
            .collect();

        registry.outbound().wait_for_sends(1);
        let id = registry.outbound().id_of(0);
        registry.on_end(id).unwrap();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(vec![]));
        }
    });

    assert_eq!(registry.outbound().count(), 1);
}

#[test]
fn remote_errors_are_shared_and_cached() {
    let registry = registry();
    let bogus = Query::new("ZZZZ", "SMART");

    scope(|s| {
        let waiter = s.spawn(|| registry.resolve_blocking(&bogus, Duration::from_secs(5)));

        registry.outbound().wait_for_sends(1);
        let id = registry.outbound().id_of(0);
        assert_eq!(
            registry.on_error(id, "No security definition has been found"),
            Ok(Routing::Applied)
        );

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Remote { ref message, .. } if message == "No security definition has been found"
        ));
    });

    // The failure is terminal: later callers get it without a new request.
    assert!(matches!(
        registry.resolve_blocking(&bogus, Duration::ZERO),
        Err(Error::Remote { .. })
    ));
    assert_eq!(registry.outbound().count(), 1);
    let entry = registry.lookup(&bogus).unwrap();
    assert!(entry.results().is_empty());
    assert_eq!(entry.error(), Some("No security definition has been found"));
}

#[test]
fn error_after_results_is_a_contract_violation() {
    let registry = registry();
    let aapl = Query::new("AAPL", "SMART");
    registry.resolve_nonblocking(&aapl);
    let id = registry.outbound().id_of(0);

    registry.on_result(id, AAPL_SMART).unwrap();
    assert!(matches!(
        registry.on_error(id, "late failure"),
        Err(Error::ContractViolation { .. })
    ));

    // The request is untouched and can still close normally.
    assert!(registry.is_pending(&aapl));
    registry.on_end(id).unwrap();
    assert_eq!(
        registry.resolve_blocking(&aapl, Duration::ZERO),
        Ok(vec![AAPL_SMART])
    );
}

#[test]
fn end_without_results_resolves_empty() {
    let registry = registry();
    let empty = Query::new("NOTHING", "SMART");
    registry.resolve_nonblocking(&empty);
    registry.on_end(registry.outbound().id_of(0)).unwrap();

    assert_eq!(registry.resolve_blocking(&empty, Duration::ZERO), Ok(vec![]));
    assert_eq!(registry.lookup(&empty).unwrap().error(), None);
}

#[test]
fn timeout_leaves_the_request_pending() {
    let registry = registry();
    let slow = Query::new("SLOW", "SMART");

    let err = registry
        .resolve_blocking(&slow, Duration::from_millis(50))
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(registry.is_pending(&slow));

    // A retry joins the same request rather than sending again.
    assert!(
        registry
            .resolve_blocking(&slow, Duration::from_millis(10))
            .unwrap_err()
            .is_timeout()
    );
    assert_eq!(registry.outbound().count(), 1);

    let id = registry.outbound().id_of(0);
    registry.on_result(id, AAPL_SMART).unwrap();
    registry.on_end(id).unwrap();

    assert_eq!(
        registry.resolve_blocking(&slow, Duration::ZERO),
        Ok(vec![AAPL_SMART])
    );
    assert_eq!(registry.outbound().count(), 1);
}

#[test]
fn unknown_and_sentinel_ids_are_unrouted() {
    let registry = registry();
    registry.resolve_nonblocking(&Query::new("AAPL", "SMART"));

    assert_eq!(
        registry.on_error(NO_REQUEST_ID, "Market data farm connection is OK"),
        Ok(Routing::Unrouted)
    );
    assert_eq!(registry.on_result(9_999, AAPL_SMART), Ok(Routing::Unrouted));
    assert_eq!(registry.on_end(9_999), Ok(Routing::Unrouted));
    assert_eq!(registry.pending_len(), 1);

    assert!(matches!(
        registry.on_result(-1, AAPL_SMART),
        Err(Error::ContractViolation { .. })
    ));
    assert!(matches!(
        registry.on_end(-5),
        Err(Error::ContractViolation { .. })
    ));
}

#[test]
fn duplicate_end_is_ignored() {
    let registry = registry();
    registry.resolve_nonblocking(&Query::new("AAPL", "SMART"));
    let id = registry.outbound().id_of(0);

    assert_eq!(registry.on_end(id), Ok(Routing::Applied));
    assert_eq!(registry.on_end(id), Ok(Routing::Unrouted));
    assert_eq!(registry.on_result(id, AAPL_SMART), Ok(Routing::Unrouted));
    assert_eq!(
        registry.lookup(&Query::new("AAPL", "SMART")).unwrap().results(),
        &[] as &[Contract]
    );
}

#[test]
fn results_keep_delivery_order() {
    let registry = registry();
    let chain = Query::new("ES", "CME");
    registry.resolve_nonblocking(&chain);
    let id = registry.outbound().id_of(0);

    let parts: Vec<Contract> = (0..10)
        .map(|con_id| Contract {
            con_id,
            symbol: "ES",
            exchange: "CME",
        })
        .collect();
    for part in &parts {
        registry.on_result(id, part.clone()).unwrap();
    }
    registry.on_end(id).unwrap();

    assert_eq!(registry.resolve_blocking(&chain, Duration::ZERO), Ok(parts));
}

#[test]
fn aliases_cache_fully_qualified_results() {
    let registry = registry().with_alias(|contract: &Contract| {
        Some(Query::new(contract.symbol, contract.exchange).key())
    });
    let partial = Query::new("AAPL", "SMART");
    registry.resolve_nonblocking(&partial);
    let id = registry.outbound().id_of(0);
    registry.on_result(id, AAPL_SMART).unwrap();
    registry.on_result(id, AAPL_NASDAQ).unwrap();
    registry.on_end(id).unwrap();

    // SMART is the original key, NASDAQ is the alias.
    assert_eq!(registry.cached_len(), 2);
    assert_eq!(
        registry.resolve_blocking(&partial, Duration::ZERO),
        Ok(vec![AAPL_SMART, AAPL_NASDAQ])
    );
    let qualified = Query::new("AAPL", "NASDAQ");
    assert_eq!(
        registry.resolve_blocking(&qualified, Duration::ZERO),
        Ok(vec![AAPL_NASDAQ])
    );
    assert_eq!(registry.outbound().count(), 1);

    let aliased = registry.lookup(&qualified).unwrap();
    assert_eq!(aliased.descriptor(), &partial);
    assert_eq!(aliased.correlation_id().get(), id);
}

#[test]
fn aliases_group_rows_by_key() {
    const MSFT_NASDAQ: Contract = Contract {
        con_id: 272093,
        symbol: "MSFT",
        exchange: "NASDAQ",
    };
    let registry = registry().with_alias(|contract: &Contract| {
        Some(Query::new(contract.symbol, contract.exchange).key())
    });
    let sector = Query::new("TECH", "SMART");
    registry.resolve_nonblocking(&sector);
    let id = registry.outbound().id_of(0);
    for row in [AAPL_SMART, MSFT_NASDAQ, AAPL_NASDAQ, AAPL_SMART] {
        registry.on_result(id, row).unwrap();
    }
    registry.on_end(id).unwrap();

    assert_eq!(registry.cached_len(), 4);
    assert_eq!(
        registry.resolve_blocking(&Query::new("aapl", "smart"), Duration::ZERO),
        Ok(vec![AAPL_SMART, AAPL_SMART])
    );
    assert_eq!(
        registry.resolve_blocking(&Query::new("MSFT", "NASDAQ"), Duration::ZERO),
        Ok(vec![MSFT_NASDAQ])
    );
    assert_eq!(
        registry.resolve_blocking(&Query::new("AAPL", "NASDAQ"), Duration::ZERO),
        Ok(vec![AAPL_NASDAQ])
    );
    assert_eq!(registry.resolve_blocking(&sector, Duration::ZERO).unwrap().len(), 4);
    assert_eq!(registry.outbound().count(), 1);
}

#[test]
fn aliases_never_shadow_existing_entries() {
    let registry = registry().with_alias(|contract: &Contract| {
        Some(Query::new(contract.symbol, contract.exchange).key())
    });
    let nasdaq = Query::new("AAPL", "NASDAQ");
    registry.resolve_nonblocking(&nasdaq);
    let nasdaq_id = registry.outbound().id_of(0);

    let smart = Query::new("AAPL", "SMART");
    registry.resolve_nonblocking(&smart);
    let smart_id = registry.outbound().id_of(1);
    registry.on_result(smart_id, AAPL_NASDAQ).unwrap();
    registry.on_end(smart_id).unwrap();

    // NASDAQ is still in flight under its own request.
    assert!(registry.is_pending(&nasdaq));
    registry.on_end(nasdaq_id).unwrap();
    assert_eq!(registry.resolve_blocking(&nasdaq, Duration::ZERO), Ok(vec![]));
}

#[test]
fn nonblocking_resolves_are_deduplicated() {
    let registry = registry();
    let aapl = Query::new("AAPL", "SMART");

    registry.resolve_nonblocking(&aapl);
    registry.resolve_nonblocking(&Query::new(" aapl ", "smart"));
    assert_eq!(registry.outbound().count(), 1);
    assert_eq!(registry.pending_len(), 1);

    registry.on_end(registry.outbound().id_of(0)).unwrap();
    registry.resolve_nonblocking(&aapl);
    assert_eq!(registry.outbound().count(), 1);
    assert_eq!(registry.cached_len(), 1);
}

#[test]
fn correlation_ids_come_from_the_shared_allocator() {
    let ids = Arc::new(IdAllocator::new(1));
    let registry: TestRegistry =
        EntityRegistry::new(Arc::clone(&ids), Arc::new(RecordingOutbound::default()));

    assert_eq!(ids.next_id().get(), 2);
    registry.resolve_nonblocking(&Query::new("AAPL", "SMART"));
    registry.resolve_nonblocking(&Query::new("MSFT", "SMART"));
    assert_eq!(ids.next_id().get(), 5);

    assert_eq!(registry.outbound().id_of(0), 3);
    assert_eq!(registry.outbound().id_of(1), 4);
    assert!(registry.lookup(&Query::new("AAPL", "SMART")).is_none());
}
