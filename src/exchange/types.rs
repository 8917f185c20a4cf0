//! Domain types shared by the exchange trait and its implementations

use serde::Deserialize;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Wire representation expected by the exchange
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Exchange-reported order state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    #[serde(other)]
    Unknown,
}

impl OrderState {
    /// Whether the order executed completely
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderState::Filled)
    }

    /// Whether the order is still working on the book
    pub fn is_open(&self) -> bool {
        matches!(self, OrderState::New | OrderState::PartiallyFilled)
    }
}

/// One entry of the open-orders snapshot
///
/// The reconcile loop consumes only `order_id`/`status`; `side` and `price`
/// feed the cold-start adoption pass.
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub order_id: u64,
    pub status: OrderState,
    pub side: OrderSide,
    pub price: f64,
}

/// Free and locked balance of one asset
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetBalance {
    pub free: f64,
    pub locked: f64,
}

impl AssetBalance {
    /// Total balance across free and locked
    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}
