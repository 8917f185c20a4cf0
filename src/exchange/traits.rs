//! Exchange capability trait - enables mocking for tests

use async_trait::async_trait;

use super::errors::ExchangeResult;
use super::types::{AssetBalance, OpenOrder, OrderSide, OrderState};

/// Spot exchange operations the grid core depends on
///
/// The production implementation is [`super::BinanceSpotClient`]; tests
/// inject [`mock::MockExchange`]. Every engine receives the client as an
/// explicit capability rather than reaching for a global handle.
#[async_trait]
pub trait SpotExchange: Send + Sync {
    /// Place a GTC limit order, returning the exchange-assigned order id
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        price: f64,
        quantity: f64,
    ) -> ExchangeResult<u64>;

    /// Fetch the full open-orders snapshot for a symbol
    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>>;

    /// Query a single order's state
    async fn get_order_status(&self, symbol: &str, order_id: u64) -> ExchangeResult<OrderState>;

    /// Current ticker price for a symbol
    async fn get_ticker_price(&self, symbol: &str) -> ExchangeResult<f64>;

    /// Free/locked balance of one asset
    async fn get_account_balance(&self, asset: &str) -> ExchangeResult<AssetBalance>;

    /// Redeem from the flexible yield product into the trading balance
    async fn redeem_savings(&self, product_id: &str, amount: f64) -> ExchangeResult<()>;

    /// Deposit idle balance into the flexible yield product
    async fn deposit_savings(&self, product_id: &str, amount: f64) -> ExchangeResult<()>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Mock exchange for exercising the grid core without a live connection.
pub mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::exchange::errors::ExchangeError;

    /// A recorded order placement
    #[derive(Debug, Clone)]
    pub struct PlacedOrder {
        pub order_id: u64,
        pub symbol: String,
        pub side: OrderSide,
        pub price: f64,
        pub quantity: f64,
    }

    /// Scriptable mock exchange
    pub struct MockExchange {
        /// Ticker price returned by `get_ticker_price`
        pub ticker_price: Mutex<f64>,
        /// Snapshot returned by `get_open_orders`
        pub open_orders: Mutex<Vec<OpenOrder>>,
        /// States returned by `get_order_status` (missing id => NotFound)
        pub order_states: Mutex<HashMap<u64, OrderState>>,
        /// Balance returned by `get_account_balance`
        pub balance: Mutex<AssetBalance>,
        /// Every successful placement, in call order
        pub placed: Mutex<Vec<PlacedOrder>>,
        /// Redeemed amounts, in call order
        pub redeemed: Mutex<Vec<f64>>,
        /// Deposited amounts, in call order
        pub deposited: Mutex<Vec<f64>>,
        /// Number of placements to fail before succeeding again
        pub fail_placements: AtomicU32,
        /// When set, `get_ticker_price` fails
        pub fail_ticker: Mutex<bool>,
        /// Count of ticker queries served or failed
        pub ticker_calls: AtomicU32,
        /// Count of single-order status queries
        pub status_calls: AtomicU32,
        next_order_id: AtomicU64,
    }

    impl MockExchange {
        pub fn new(ticker_price: f64) -> Self {
            Self {
                ticker_price: Mutex::new(ticker_price),
                open_orders: Mutex::new(Vec::new()),
                order_states: Mutex::new(HashMap::new()),
                balance: Mutex::new(AssetBalance::default()),
                placed: Mutex::new(Vec::new()),
                redeemed: Mutex::new(Vec::new()),
                deposited: Mutex::new(Vec::new()),
                fail_placements: AtomicU32::new(0),
                fail_ticker: Mutex::new(false),
                ticker_calls: AtomicU32::new(0),
                status_calls: AtomicU32::new(0),
                next_order_id: AtomicU64::new(1),
            }
        }

        pub async fn set_ticker_price(&self, price: f64) {
            *self.ticker_price.lock().await = price;
        }

        /// Script the next `n` placements to be rejected
        pub fn fail_next_placements(&self, n: u32) {
            self.fail_placements.store(n, Ordering::SeqCst);
        }

        /// Mark an order as filled for subsequent status queries and drop it
        /// from the open-orders snapshot
        pub async fn fill_order(&self, order_id: u64) {
            self.order_states
                .lock()
                .await
                .insert(order_id, OrderState::Filled);
            self.open_orders
                .lock()
                .await
                .retain(|o| o.order_id != order_id);
        }

        pub async fn last_placed(&self) -> Option<PlacedOrder> {
            self.placed.lock().await.last().cloned()
        }

        pub async fn placed_count(&self) -> usize {
            self.placed.lock().await.len()
        }
    }

    #[async_trait]
    impl SpotExchange for MockExchange {
        async fn place_limit_order(
            &self,
            symbol: &str,
            side: OrderSide,
            price: f64,
            quantity: f64,
        ) -> ExchangeResult<u64> {
            let remaining = self.fail_placements.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_placements.store(remaining - 1, Ordering::SeqCst);
                return Err(ExchangeError::OrderRejected {
                    code: -2010,
                    reason: "Account has insufficient balance".into(),
                });
            }

            let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
            self.placed.lock().await.push(PlacedOrder {
                order_id,
                symbol: symbol.to_string(),
                side,
                price,
                quantity,
            });
            self.order_states
                .lock()
                .await
                .insert(order_id, OrderState::New);
            self.open_orders.lock().await.push(OpenOrder {
                order_id,
                status: OrderState::New,
                side,
                price,
            });
            Ok(order_id)
        }

        async fn get_open_orders(&self, _symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
            Ok(self.open_orders.lock().await.clone())
        }

        async fn get_order_status(
            &self,
            _symbol: &str,
            order_id: u64,
        ) -> ExchangeResult<OrderState> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.order_states
                .lock()
                .await
                .get(&order_id)
                .copied()
                .ok_or(ExchangeError::NotFound)
        }

        async fn get_ticker_price(&self, _symbol: &str) -> ExchangeResult<f64> {
            self.ticker_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail_ticker.lock().await {
                return Err(ExchangeError::Network("mock ticker failure".into()));
            }
            Ok(*self.ticker_price.lock().await)
        }

        async fn get_account_balance(&self, _asset: &str) -> ExchangeResult<AssetBalance> {
            Ok(*self.balance.lock().await)
        }

        async fn redeem_savings(&self, _product_id: &str, amount: f64) -> ExchangeResult<()> {
            self.redeemed.lock().await.push(amount);
            Ok(())
        }

        async fn deposit_savings(&self, _product_id: &str, amount: f64) -> ExchangeResult<()> {
            self.deposited.lock().await.push(amount);
            Ok(())
        }
    }
}
