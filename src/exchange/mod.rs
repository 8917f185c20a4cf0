//! Exchange capability layer
//!
//! The grid core depends on the [`SpotExchange`] trait only; the production
//! implementation is [`BinanceSpotClient`], and tests use
//! [`traits::mock::MockExchange`].

pub mod binance;
pub mod errors;
pub mod traits;
pub mod types;

pub use binance::{BinanceSpotClient, BINANCE_API_URL};
pub use errors::{ExchangeError, ExchangeResult};
pub use traits::SpotExchange;
pub use types::{AssetBalance, OpenOrder, OrderSide, OrderState};
