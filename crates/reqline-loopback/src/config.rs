use core::time::Duration;

use anyhow::bail;
use clap::Parser;
use reqline::{OrderIdStrategy, RateLimit, SessionConfig};

use crate::{venue::VenueConfig, workload::WorkloadConfig};

/// Runtime configuration for the `reqline-loopback` binary.
///
/// Every setting can be given as a flag or an environment variable (a `.env`
/// file in the working directory is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "reqline-loopback",
    version,
    about = "Drives a reqline session against an in-process venue"
)]
pub struct CliArgs {
    /// Maximum outbound calls per rate window. `0` disables rate limiting.
    ///
    /// Environment variable: `RATE_LIMIT`
    #[arg(long, env = "RATE_LIMIT", default_value_t = 45)]
    pub rate_limit: u32,

    /// Length of the sliding rate window in milliseconds.
    ///
    /// Environment variable: `RATE_WINDOW_MS`
    #[arg(long, env = "RATE_WINDOW_MS", default_value_t = 1_000)]
    pub rate_window_ms: u64,

    /// Default bound for blocking calls, in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 600)]
    pub request_timeout_secs: u64,

    /// `remote` asks the venue for every order id; `local` increments the
    /// last value the venue delivered.
    ///
    /// Environment variable: `ORDER_ID_STRATEGY`
    #[arg(long, env = "ORDER_ID_STRATEGY", default_value_t = String::from("remote"))]
    pub order_id_strategy: String,

    /// Pause between re-issued order-id requests in milliseconds. `0` sends
    /// one request per ticket.
    ///
    /// Environment variable: `REISSUE_INTERVAL_MS`
    #[arg(long, env = "REISSUE_INTERVAL_MS", default_value_t = 10)]
    pub reissue_interval_ms: u64,

    /// Ids start strictly above this value.
    ///
    /// Environment variable: `ID_BASELINE`
    #[arg(long, env = "ID_BASELINE", default_value_t = 1)]
    pub id_baseline: i64,

    /// Simulated venue round trip in milliseconds.
    ///
    /// Environment variable: `VENUE_LATENCY_MS`
    #[arg(long, env = "VENUE_LATENCY_MS", default_value_t = 20)]
    pub venue_latency_ms: u64,

    /// Rows the venue returns for each successful lookup.
    ///
    /// Environment variable: `VENUE_ROWS`
    #[arg(long, env = "VENUE_ROWS", default_value_t = 2)]
    pub venue_rows: usize,

    /// Order id the venue pushes unsolicited on startup.
    ///
    /// Environment variable: `FIRST_ORDER_ID`
    #[arg(long, env = "FIRST_ORDER_ID", default_value_t = 1_000)]
    pub first_order_id: i64,

    /// Comma-separated `SYMBOL` or `SYMBOL@EXCHANGE` queries. `unknown` makes
    /// the venue fail the lookup.
    ///
    /// Environment variable: `SYMBOLS`
    #[arg(
        long,
        env = "SYMBOLS",
        value_delimiter = ',',
        default_value = "AAPL,MSFT,AAPL@NASDAQ,ES@CME,unknown"
    )]
    pub symbols: Vec<String>,

    /// Threads resolving every symbol concurrently.
    ///
    /// Environment variable: `RESOLVERS`
    #[arg(long, env = "RESOLVERS", default_value_t = 8)]
    pub resolvers: usize,

    /// Threads taking order ids concurrently.
    ///
    /// Environment variable: `ORDER_TAKERS`
    #[arg(long, env = "ORDER_TAKERS", default_value_t = 4)]
    pub order_takers: usize,

    /// Order ids each taker requests.
    ///
    /// Environment variable: `ORDERS_PER_TAKER`
    #[arg(long, env = "ORDERS_PER_TAKER", default_value_t = 5)]
    pub orders_per_taker: usize,
}

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub session: SessionConfig,
    pub venue: VenueConfig,
    pub workload: WorkloadConfig,
}

impl TryFrom<CliArgs> for LoopbackConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let strategy: OrderIdStrategy = args.order_id_strategy.parse()?;

        let rate_limit = match args.rate_limit {
            0 => None,
            max_calls => Some(RateLimit::new(
                max_calls,
                Duration::from_millis(args.rate_window_ms),
            )),
        };
        let reissue_interval = match args.reissue_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let session = SessionConfig::default()
            .with_rate_limit(rate_limit)
            .with_request_timeout(Duration::from_secs(args.request_timeout_secs))
            .with_order_id_strategy(strategy)
            .with_reissue_interval(reissue_interval)
            .with_id_baseline(args.id_baseline);
        session.validate()?;

        if args.first_order_id < 0 {
            bail!("FIRST_ORDER_ID must not be negative");
        }

        let symbols: Vec<String> = args
            .symbols
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() && args.resolvers > 0 {
            bail!("SYMBOLS must name at least one query when RESOLVERS > 0");
        }

        Ok(Self {
            session,
            venue: VenueConfig {
                latency: Duration::from_millis(args.venue_latency_ms),
                rows: args.venue_rows,
                first_order_id: args.first_order_id,
            },
            workload: WorkloadConfig {
                symbols,
                resolvers: args.resolvers,
                order_takers: args.order_takers,
                orders_per_taker: args.orders_per_taker,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<LoopbackConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("reqline-loopback").chain(args.iter().copied()))?;
        LoopbackConfig::try_from(args)
    }

    #[test]
    fn defaults_build_a_valid_session() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.workload.symbols.len(), 5);
    }

    #[test]
    fn zero_disables_rate_limit_and_reissue() {
        let config = parse(&["--rate-limit", "0", "--reissue-interval-ms", "0"]).unwrap();
        assert_eq!(config.session.rate_limit, None);
        assert_eq!(config.session.reissue_interval, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--order-id-strategy", "sideways"]).is_err());
        assert!(parse(&["--request-timeout-secs", "0"]).is_err());
        assert!(parse(&["--id-baseline=-4"]).is_err());
        assert!(parse(&["--symbols", " , "]).is_err());
    }

    #[test]
    fn strategy_is_case_insensitive() {
        let config = parse(&["--order-id-strategy", "LOCAL"]).unwrap();
        assert_eq!(config.session.order_id_strategy, OrderIdStrategy::Local);
    }
}
