#![deny(unreachable_pub)]
pub mod config;
pub mod exchange;
pub mod grid;
pub mod notify;
pub mod runner;
pub mod treasury;

pub use crate::config::Settings;
pub use crate::exchange::{BinanceSpotClient, ExchangeError, SpotExchange};
pub use crate::grid::{GridError, GridResult, SymbolConfig, SymbolGridEngine};
pub use crate::notify::{Notifier, WebhookNotifier};
pub use crate::runner::Runner;
pub use crate::treasury::BalanceManager;
