use std::{
    collections::HashSet,
    sync::Barrier,
    thread,
    time::{Duration, Instant},
};

use reqline::Error;

use crate::venue::{ContractQuery, LoopbackSession};

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub symbols: Vec<String>,
    pub resolvers: usize,
    pub order_takers: usize,
    pub orders_per_taker: usize,
}

/// What a run did, as observed from the application side.
#[derive(Debug, Default)]
pub struct Summary {
    pub elapsed: Duration,
    pub resolved: usize,
    pub rows: usize,
    pub remote_errors: usize,
    pub timeouts: usize,
    pub order_ids: Vec<i64>,
    pub lookups_sent: usize,
    pub order_id_requests_sent: usize,
    pub cached: usize,
}

impl Summary {
    /// Returns `true` if no order id was handed out twice.
    pub fn order_ids_unique(&self) -> bool {
        let distinct: HashSet<_> = self.order_ids.iter().collect();
        distinct.len() == self.order_ids.len()
    }
}

#[derive(Default)]
struct ResolverTally {
    resolved: usize,
    rows: usize,
    remote_errors: usize,
    timeouts: usize,
}

/// Runs resolvers and order-id takers against `session` concurrently.
///
/// Every resolver walks the full symbol list from a different starting point,
/// so the same descriptors are requested from several threads at once.
pub fn run(session: &LoopbackSession, config: &WorkloadConfig) -> anyhow::Result<Summary> {
    let barrier = Barrier::new(config.resolvers + config.order_takers);
    let start = Instant::now();

    let (tallies, takers) = thread::scope(|s| {
        let resolvers: Vec<_> = (0..config.resolvers)
            .map(|offset| {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    resolve_all(session, &config.symbols, offset)
                })
            })
            .collect();
        let takers: Vec<_> = (0..config.order_takers)
            .map(|_| {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    (0..config.orders_per_taker)
                        .map(|_| session.next_order_id())
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();

        (
            resolvers.into_iter().map(|h| h.join()).collect::<Vec<_>>(),
            takers.into_iter().map(|h| h.join()).collect::<Vec<_>>(),
        )
    });

    let mut summary = Summary {
        elapsed: start.elapsed(),
        ..Summary::default()
    };
    for tally in tallies {
        let tally = tally.map_err(|_| anyhow::anyhow!("resolver thread panicked"))?;
        summary.resolved += tally.resolved;
        summary.rows += tally.rows;
        summary.remote_errors += tally.remote_errors;
        summary.timeouts += tally.timeouts;
    }
    for taker in takers {
        let ids = taker.map_err(|_| anyhow::anyhow!("order-id taker panicked"))??;
        summary.order_ids.extend(ids);
    }
    summary.lookups_sent = session.collaborator().lookups();
    summary.order_id_requests_sent = session.collaborator().order_id_requests();
    summary.cached = session.registry().cached_len();

    Ok(summary)
}

fn resolve_all(session: &LoopbackSession, symbols: &[String], offset: usize) -> ResolverTally {
    let mut tally = ResolverTally::default();
    for i in 0..symbols.len() {
        let query = ContractQuery::parse(&symbols[(i + offset) % symbols.len()]);
        match session.resolve_blocking(&query) {
            Ok(rows) => {
                tally.resolved += 1;
                tally.rows += rows.len();
            }
            Err(Error::Remote { message, .. }) => {
                tracing::debug!(?query, %message, "lookup failed");
                tally.remote_errors += 1;
            }
            Err(err) if err.is_timeout() => tally.timeouts += 1,
            Err(err) => tracing::error!(?query, %err, "lookup rejected"),
        }
    }
    tally
}
