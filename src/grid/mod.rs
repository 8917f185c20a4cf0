//! Price-grid trading core
//!
//! One [`SymbolGridEngine`] per configured symbol owns that symbol's ladder
//! of entry/take-profit positions and rolls it forward once per poll:
//!
//! - [`config`] - per-symbol grid policy and ladder math
//! - [`types`] - discretized price keys and position state
//! - [`errors`] - grid-specific error types
//! - [`engine`] - the reconcile-and-replenish cycle

pub mod config;
pub mod engine;
pub mod errors;
pub mod types;

pub use config::SymbolConfig;
pub use engine::SymbolGridEngine;
pub use errors::{GridError, GridResult};
pub use types::{GridPosition, PositionStatus, PriceKey};
