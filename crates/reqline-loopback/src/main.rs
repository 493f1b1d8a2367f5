mod config;
mod telemetry;
mod venue;
mod workload;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use config::{CliArgs, LoopbackConfig};
use reqline::Session;
use telemetry::init_telemetry;
use venue::{Contract, LoopbackSession};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = LoopbackConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let (client, inbox) = venue::connect();
    let session: Arc<LoopbackSession> =
        Arc::new(Session::new(config.session.clone(), client)?.with_alias(Contract::alias));
    let reader = venue::spawn_reader(config.venue.clone(), &session, inbox)
        .context("failed to start the venue reader")?;

    let summary = workload::run(&session, &config.workload)?;

    tracing::info!(
        elapsed = ?summary.elapsed,
        resolved = summary.resolved,
        rows = summary.rows,
        remote_errors = summary.remote_errors,
        timeouts = summary.timeouts,
        lookups_sent = summary.lookups_sent,
        cached_keys = summary.cached,
        "lookups finished"
    );
    tracing::info!(
        taken = summary.order_ids.len(),
        first = ?summary.order_ids.iter().min(),
        last = ?summary.order_ids.iter().max(),
        requests_sent = summary.order_id_requests_sent,
        next_request_id = session.next_request_id().get(),
        "order ids finished"
    );
    if !summary.order_ids_unique() {
        anyhow::bail!("an order id was handed out twice: {:?}", summary.order_ids);
    }

    drop(session);
    reader
        .join()
        .map_err(|_| anyhow::anyhow!("venue reader panicked"))?;
    tracing::info!("Loopback run complete");
    Ok(())
}

fn log_startup_info(config: &LoopbackConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting loopback run with full config: {:#?}", config);
    } else {
        tracing::info!(
            strategy = %config.session.order_id_strategy,
            resolvers = config.workload.resolvers,
            order_takers = config.workload.order_takers,
            "Starting loopback run"
        );
    }
}
