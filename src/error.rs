//! Error types for the Smart Energy client.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by collaborators and by the public client handle.
///
/// Inside the state machine every variant is treated as a transient failure:
/// the step is logged and retried by the retry timer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SepError {
    /// A blocking transaction did not complete in time
    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),

    /// The mesh transport rejected or failed the transaction
    #[error("transport error: {0}")]
    Transport(String),

    /// Keep-alive period outside the 5 to 20 minute window
    #[error("keep-alive period of {period_ms} ms is outside {min_ms}..={max_ms} ms")]
    InvalidKeepAlivePeriod {
        period_ms: u128,
        min_ms: u128,
        max_ms: u128,
    },

    /// Client configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IEEE address could not be parsed
    #[error("invalid IEEE address: {0}")]
    InvalidIeeeAddress(String),

    /// The client event loop is no longer running
    #[error("smart energy client has stopped")]
    ClientStopped,
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SepError>;
