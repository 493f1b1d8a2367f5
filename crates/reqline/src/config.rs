use core::time::Duration;

use crate::{
    DEFAULT_ID_BASELINE,
    error::{Error, Result},
    order_id::{DEFAULT_REISSUE_INTERVAL, OrderIdStrategy},
    rate_limit::RateLimit,
};

/// How long a blocking call waits when the caller does not pass a timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Settings for one [`Session`](crate::Session).
///
/// # Example
///
/// ```
/// use core::time::Duration;
/// use reqline::{OrderIdStrategy, SessionConfig};
///
/// let config = SessionConfig::default()
///     .with_order_id_strategy(OrderIdStrategy::Local)
///     .with_request_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Outbound budget. `None` disables admission control.
    pub rate_limit: Option<RateLimit>,
    /// Default bound for blocking lookups and order-id waits.
    pub request_timeout: Duration,
    pub order_id_strategy: OrderIdStrategy,
    /// Pause between re-issued order-id requests. `None` sends exactly one
    /// request per ticket.
    pub reissue_interval: Option<Duration>,
    /// Ids start strictly above this value.
    pub id_baseline: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rate_limit: Some(RateLimit::DEFAULT),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            order_id_strategy: OrderIdStrategy::default(),
            reissue_interval: Some(DEFAULT_REISSUE_INTERVAL),
            id_baseline: DEFAULT_ID_BASELINE,
        }
    }
}

impl SessionConfig {
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimit>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_order_id_strategy(mut self, strategy: OrderIdStrategy) -> Self {
        self.order_id_strategy = strategy;
        self
    }

    pub fn with_reissue_interval(mut self, interval: Option<Duration>) -> Self {
        self.reissue_interval = interval;
        self
    }

    pub fn with_id_baseline(mut self, baseline: i64) -> Self {
        self.id_baseline = baseline;
        self
    }

    /// Checks the settings for values no session can run with.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for an empty rate budget, a zero
    /// timeout or reissue interval, or a negative baseline.
    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = &self.rate_limit {
            limit.validate()?;
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be non-zero"));
        }
        if self.reissue_interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::config(
                "reissue interval must be non-zero (use None to disable)",
            ));
        }
        if self.id_baseline < 0 {
            return Err(Error::config(format!(
                "id baseline must not be negative, got {}",
                self.id_baseline
            )));
        }
        Ok(())
    }
}
