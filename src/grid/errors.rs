//! Grid-specific error types

use thiserror::Error;

use crate::exchange::ExchangeError;

/// Errors that can occur in grid trading operations
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid grid configuration: {0}")]
    InvalidConfig(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

/// Result type for grid operations
pub type GridResult<T> = std::result::Result<T, GridError>;
