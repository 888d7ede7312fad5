//! Smart Energy client configuration

use std::time::Duration;

use crate::error::{Result, SepError};

/// Delay before an "immediate" step runs (1 second)
pub const DEFAULT_TIMER_IMMEDIATE: Duration = Duration::from_millis(1000);

/// Extra wait before the same step is repeated (30 seconds)
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_millis(30_000);

/// Timer fires allowed in one state before discovery is abandoned
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wait before retrying a failed key establishment when the server gave no hint
pub const DEFAULT_KEY_ESTABLISHMENT_BACKOFF: Duration = Duration::from_millis(30_000);

/// Default keep-alive poll interval (10 minutes)
pub const KEEPALIVE_PERIOD_DEFAULT: Duration = Duration::from_millis(600_000);

/// Shortest keep-alive interval allowed by SEP (5 minutes)
pub const KEEPALIVE_PERIOD_MINIMUM: Duration = Duration::from_millis(300_000);

/// Longest keep-alive interval allowed by SEP (20 minutes)
pub const KEEPALIVE_PERIOD_MAXIMUM: Duration = Duration::from_millis(1_200_000);

/// Default bound on blocking transactions
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Smart Energy client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SepClientConfig {
    /// Delay before the first attempt of each discovery step
    pub timer_immediate: Duration,

    /// Added to the first delay to get the repeat period of a step
    pub retry_period: Duration,

    /// Retry budget per state
    pub max_retries: u32,

    /// Backoff after a failed key establishment with no server hint
    pub key_establishment_backoff: Duration,

    /// Keep-alive poll interval
    pub keep_alive_period: Duration,

    /// Bound on identity resolution and liveness reads
    pub transaction_timeout: Duration,

    /// Look for the SEP 1.2 Keep-Alive cluster before entering keep-alive
    pub discover_keep_alive_cluster: bool,
}

impl Default for SepClientConfig {
    fn default() -> Self {
        Self {
            timer_immediate: DEFAULT_TIMER_IMMEDIATE,
            retry_period: DEFAULT_RETRY_PERIOD,
            max_retries: DEFAULT_MAX_RETRIES,
            key_establishment_backoff: DEFAULT_KEY_ESTABLISHMENT_BACKOFF,
            keep_alive_period: KEEPALIVE_PERIOD_DEFAULT,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            discover_keep_alive_cluster: false,
        }
    }
}

impl SepClientConfig {
    /// Check the configuration before the client is started
    pub fn validate(&self) -> Result<()> {
        validate_keep_alive_period(self.keep_alive_period)?;
        if self.timer_immediate.is_zero() {
            return Err(SepError::InvalidConfig(
                "timer_immediate must be greater than zero".to_string(),
            ));
        }
        if self.transaction_timeout.is_zero() {
            return Err(SepError::InvalidConfig(
                "transaction_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reject keep-alive periods outside the 5 to 20 minute window
pub fn validate_keep_alive_period(period: Duration) -> Result<()> {
    if period < KEEPALIVE_PERIOD_MINIMUM || period > KEEPALIVE_PERIOD_MAXIMUM {
        return Err(SepError::InvalidKeepAlivePeriod {
            period_ms: period.as_millis(),
            min_ms: KEEPALIVE_PERIOD_MINIMUM.as_millis(),
            max_ms: KEEPALIVE_PERIOD_MAXIMUM.as_millis(),
        });
    }
    Ok(())
}
