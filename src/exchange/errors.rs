//! Exchange error taxonomy

use thiserror::Error;

/// Errors surfaced by exchange operations
///
/// The grid core treats `RateLimited` and `Network` exactly like any other
/// failed query: the cycle degrades and the fixed poll interval is the only
/// backoff.
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    #[error("Order rejected (code {code}): {reason}")]
    OrderRejected { code: i64, reason: String },

    #[error("Order not found")]
    NotFound,

    #[error("Rate limited by exchange")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (code {code}): {reason}")]
    Api { code: i64, reason: String },

    #[error("Response parse error: {0}")]
    Parse(String),
}

/// Result type for exchange operations
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
