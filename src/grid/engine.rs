//! Per-symbol grid engine - the reconcile-and-replenish cycle

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};

use crate::exchange::{OrderSide, OrderState, SpotExchange};
use crate::notify::Notifier;

use super::config::SymbolConfig;
use super::errors::GridResult;
use super::types::{GridPosition, PositionStatus, PriceKey};

/// Owns one symbol's position map and rolls its order grid forward
///
/// One engine per symbol, one cycle per scheduler tick. The engine holds no
/// client handle; every cycle receives the exchange and notifier as explicit
/// capabilities so tests can inject fakes.
pub struct SymbolGridEngine {
    config: SymbolConfig,
    /// Rungs at or below `base_price - balance_buffer * price_interval`
    /// stay unarmed; the treasury only funds the buffered window
    balance_buffer: u32,
    positions: BTreeMap<PriceKey, GridPosition>,
}

impl SymbolGridEngine {
    /// Create an engine with an empty position map
    pub fn new(config: SymbolConfig, balance_buffer: u32) -> GridResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            balance_buffer,
            positions: BTreeMap::new(),
        })
    }

    /// Grid policy this engine runs
    pub fn config(&self) -> &SymbolConfig {
        &self.config
    }

    /// Current position map (ascending by price)
    pub fn positions(&self) -> &BTreeMap<PriceKey, GridPosition> {
        &self.positions
    }

    /// One-shot cold-start pass: adopt resting orders at recognized rung
    /// prices so a restart does not stack duplicate entries.
    ///
    /// Resting BUYs at a rung become `EntryPlaced`; resting SELLs at a
    /// rung's exit price become `WaitingProfit`. Anything else is logged and
    /// left alone.
    pub async fn adopt_open_orders<E: SpotExchange>(&mut self, exchange: &E) -> GridResult<()> {
        let open_orders = exchange.get_open_orders(&self.config.symbol).await?;

        let rungs: HashMap<PriceKey, f64> = (0..self.config.max_orders)
            .map(|i| {
                let price = self.config.rung_price(i);
                (self.config.price_key(price), price)
            })
            .collect();

        let mut adopted = 0usize;
        for order in &open_orders {
            let key = self.config.price_key(order.price);

            match order.side {
                OrderSide::Buy => {
                    let Some(&entry_price) = rungs.get(&key) else {
                        info!(
                            "{}: ignoring open order {} at {} (no matching rung)",
                            self.config.symbol, order.order_id, order.price
                        );
                        continue;
                    };
                    if self.positions.contains_key(&key) {
                        warn!(
                            "{}: duplicate open order {} at rung {}, leaving it alone",
                            self.config.symbol, order.order_id, entry_price
                        );
                        continue;
                    }
                    let exit_price = self.config.exit_price(entry_price);
                    self.positions.insert(
                        key,
                        GridPosition::entry_placed(order.order_id, entry_price, exit_price),
                    );
                    adopted += 1;
                }
                OrderSide::Sell => {
                    // A sell at `p` is the take-profit of the rung at
                    // `p - profit_interval`
                    let entry_raw = order.price - self.config.profit_interval;
                    let entry_key = self.config.price_key(entry_raw);
                    let Some(&entry_price) = rungs.get(&entry_key) else {
                        info!(
                            "{}: ignoring open order {} at {} (no matching rung)",
                            self.config.symbol, order.order_id, order.price
                        );
                        continue;
                    };
                    if self.positions.contains_key(&entry_key) {
                        warn!(
                            "{}: duplicate open order {} for rung {}, leaving it alone",
                            self.config.symbol, order.order_id, entry_price
                        );
                        continue;
                    }
                    let exit_price = self.config.exit_price(entry_price);
                    self.positions.insert(
                        entry_key,
                        GridPosition::adopted_exit(order.order_id, entry_price, exit_price),
                    );
                    adopted += 1;
                }
            }
        }

        info!(
            "{}: adopted {} of {} open orders at startup",
            self.config.symbol,
            adopted,
            open_orders.len()
        );
        Ok(())
    }

    /// One full cycle: fetch market state, reconcile every tracked level,
    /// then replenish empty rungs.
    ///
    /// A failed price or open-orders fetch aborts the cycle (retried on the
    /// next tick); failures on individual levels never abort the others.
    pub async fn reconcile_and_replenish<E, N>(
        &mut self,
        exchange: &E,
        notifier: &N,
    ) -> GridResult<()>
    where
        E: SpotExchange,
        N: Notifier,
    {
        let current_price = exchange.get_ticker_price(&self.config.symbol).await?;

        // One batched snapshot replaces per-order polling; ids missing from
        // it fall back to a direct status query during reconciliation
        let open: HashMap<u64, OrderState> = exchange
            .get_open_orders(&self.config.symbol)
            .await?
            .into_iter()
            .map(|o| (o.order_id, o.status))
            .collect();

        debug!(
            "{}: cycle start, price={}, {} open orders, {} tracked levels",
            self.config.symbol,
            current_price,
            open.len(),
            self.positions.len()
        );

        self.reconcile(exchange, notifier, &open, current_price).await;
        self.replenish(exchange, current_price).await;

        Ok(())
    }

    /// Resolve whether an order has fully filled.
    ///
    /// Present in the open snapshot means still working. Absent means it may
    /// have filled and been pruned between poll and query, so ask directly;
    /// a failed query degrades to "not confirmed filled this cycle".
    async fn order_filled<E: SpotExchange>(
        &self,
        exchange: &E,
        open: &HashMap<u64, OrderState>,
        order_id: u64,
    ) -> bool {
        if let Some(state) = open.get(&order_id) {
            return state.is_filled();
        }

        match exchange.get_order_status(&self.config.symbol, order_id).await {
            Ok(state) => state.is_filled(),
            Err(e) => {
                warn!(
                    "{}: status query for order {} failed, treating as unfilled this cycle: {}",
                    self.config.symbol, order_id, e
                );
                false
            }
        }
    }

    /// Walk every tracked level (ascending price) and advance its state
    /// machine from observed fills.
    async fn reconcile<E, N>(
        &mut self,
        exchange: &E,
        notifier: &N,
        open: &HashMap<u64, OrderState>,
        current_price: f64,
    ) where
        E: SpotExchange,
        N: Notifier,
    {
        let keys: Vec<PriceKey> = self.positions.keys().copied().collect();
        let current_key = self.config.price_key(current_price);

        for key in keys {
            let Some(position) = self.positions.get(&key).cloned() else {
                continue;
            };

            match position.status {
                PositionStatus::EntryPlaced => {
                    let Some(entry_id) = position.entry_order_id else {
                        warn!(
                            "{}: level {} is EntryPlaced without an entry id, skipping",
                            self.config.symbol, position.entry_price
                        );
                        continue;
                    };

                    if !self.order_filled(exchange, open, entry_id).await {
                        continue;
                    }

                    info!(
                        "{}: entry {} filled at {}, placing take-profit at {}",
                        self.config.symbol, entry_id, position.entry_price, position.exit_price
                    );

                    match exchange
                        .place_limit_order(
                            &self.config.symbol,
                            OrderSide::Sell,
                            position.exit_price,
                            self.config.order_amount,
                        )
                        .await
                    {
                        Ok(exit_id) => {
                            if let Some(p) = self.positions.get_mut(&key) {
                                p.mark_waiting_profit(exit_id);
                            }
                            info!(
                                "{}: take-profit {} resting at {}",
                                self.config.symbol, exit_id, position.exit_price
                            );
                        }
                        Err(e) => {
                            // The entry fill is not lost; next cycle re-detects
                            // it and retries the exit
                            warn!(
                                "{}: take-profit placement at {} failed, retrying next cycle: {}",
                                self.config.symbol, position.exit_price, e
                            );
                        }
                    }
                }
                PositionStatus::WaitingProfit => {
                    let Some(exit_id) = position.exit_order_id else {
                        warn!(
                            "{}: level {} is WaitingProfit without an exit id, skipping",
                            self.config.symbol, position.entry_price
                        );
                        continue;
                    };

                    if !self.order_filled(exchange, open, exit_id).await {
                        continue;
                    }

                    info!(
                        "{}: take-profit {} filled at {} (entry {})",
                        self.config.symbol, exit_id, position.exit_price, position.entry_price
                    );
                    notifier
                        .send(
                            "Take-profit filled",
                            &format!(
                                "{}: sold {} at {} (entry {})",
                                self.config.symbol,
                                self.config.order_amount,
                                position.exit_price,
                                position.entry_price
                            ),
                        )
                        .await;

                    if current_key >= key {
                        // Round trip complete and the market still trades at
                        // or above this rung: clear the ids, then re-enter.
                        // If the re-entry is rejected the level sits at
                        // NoOrder and this cycle's replenish pass retries it.
                        if let Some(p) = self.positions.get_mut(&key) {
                            p.reset();
                        }

                        match exchange
                            .place_limit_order(
                                &self.config.symbol,
                                OrderSide::Buy,
                                position.entry_price,
                                self.config.order_amount,
                            )
                            .await
                        {
                            Ok(entry_id) => {
                                if let Some(p) = self.positions.get_mut(&key) {
                                    p.rearm(entry_id);
                                }
                                info!(
                                    "{}: re-entered level {} with order {}",
                                    self.config.symbol, position.entry_price, entry_id
                                );
                            }
                            Err(e) => {
                                warn!(
                                    "{}: re-entry at {} failed, replenishment will retry: {}",
                                    self.config.symbol, position.entry_price, e
                                );
                            }
                        }
                    } else {
                        // Market dropped below the rung since entry; retire
                        // the level until price action revisits it
                        self.positions.remove(&key);
                        info!(
                            "{}: level {} retired (price {} below entry)",
                            self.config.symbol, position.entry_price, current_price
                        );
                    }
                }
                PositionStatus::NoOrder => {
                    // Armed by the replenishment pass
                }
            }
        }
    }

    /// Arm every empty rung inside the funded window at or below market.
    async fn replenish<E: SpotExchange>(&mut self, exchange: &E, current_price: f64) {
        let current_key = self.config.price_key(current_price);
        let floor_key = self.config.floor_key(self.balance_buffer);

        for i in 0..self.config.max_orders {
            let price = self.config.rung_price(i);
            let key = self.config.price_key(price);

            if key > current_key {
                // No above-market buys
                continue;
            }
            if key <= floor_key {
                // Rungs decrease monotonically; everything below the funded
                // window stays unarmed
                break;
            }

            let needs_entry = match self.positions.get(&key) {
                None => true,
                Some(p) => p.status == PositionStatus::NoOrder,
            };
            if !needs_entry {
                continue;
            }

            match exchange
                .place_limit_order(
                    &self.config.symbol,
                    OrderSide::Buy,
                    price,
                    self.config.order_amount,
                )
                .await
            {
                Ok(entry_id) => {
                    let exit_price = self.config.exit_price(price);
                    self.positions
                        .insert(key, GridPosition::entry_placed(entry_id, price, exit_price));
                    info!(
                        "{}: armed level {} with entry order {}",
                        self.config.symbol, price, entry_id
                    );
                }
                Err(e) => {
                    // Level state untouched; retried next cycle
                    warn!(
                        "{}: entry placement at {} failed: {}",
                        self.config.symbol, price, e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::traits::mock::MockExchange;
    use crate::exchange::OpenOrder;
    use crate::notify::mock::RecordingNotifier;
    use crate::notify::NoopNotifier;

    const BUFFER: u32 = 5;

    fn usdc_config() -> SymbolConfig {
        SymbolConfig {
            symbol: "USDCUSDT".to_string(),
            base_price: 1.0,
            max_orders: 10,
            order_amount: 10.0,
            price_interval: 0.0001,
            profit_interval: 0.0001,
            tick_precision: 4,
        }
    }

    fn engine() -> SymbolGridEngine {
        SymbolGridEngine::new(usdc_config(), BUFFER).unwrap()
    }

    fn key_of(engine: &SymbolGridEngine, price: f64) -> PriceKey {
        engine.config().price_key(price)
    }

    #[tokio::test]
    async fn test_replenish_arms_funded_window_only() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);

        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();

        // Rungs 1.0000 .. 0.9996 are armed; 0.9995 (the buffer floor) and
        // below stay empty
        assert_eq!(exchange.placed_count().await, 5);
        assert_eq!(engine.positions().len(), 5);
        for placed in exchange.placed.lock().await.iter() {
            assert_eq!(placed.side, OrderSide::Buy);
            assert!(placed.price > 0.9995);
        }
        for p in engine.positions().values() {
            assert_eq!(p.status, PositionStatus::EntryPlaced);
            assert!(p.is_consistent());
        }
    }

    #[tokio::test]
    async fn test_replenish_skips_above_market() {
        let mut engine = engine();
        let exchange = MockExchange::new(0.9997);

        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();

        // Only 0.9997 and 0.9996 are at-or-below market and above the floor
        assert_eq!(exchange.placed_count().await, 2);
        assert!(engine.positions().contains_key(&key_of(&engine, 0.9997)));
        assert!(engine.positions().contains_key(&key_of(&engine, 0.9996)));
    }

    #[tokio::test]
    async fn test_back_to_back_cycles_are_idempotent() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);

        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();
        let after_first = exchange.placed_count().await;

        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();

        assert_eq!(exchange.placed_count().await, after_first);
    }

    #[tokio::test]
    async fn test_entry_fill_places_exactly_one_exit() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);

        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();

        let key = key_of(&engine, 0.9999);
        let entry_id = engine.positions()[&key].entry_order_id.unwrap();
        exchange.fill_order(entry_id).await;

        let before = exchange.placed_count().await;
        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();

        // One sell, no extra buys (every other level is still occupied)
        assert_eq!(exchange.placed_count().await, before + 1);
        let exit = exchange.last_placed().await.unwrap();
        assert_eq!(exit.side, OrderSide::Sell);
        assert!((exit.price - 1.0).abs() < 1e-9);
        assert!((exit.quantity - 10.0).abs() < 1e-9);

        let position = &engine.positions()[&key];
        assert_eq!(position.status, PositionStatus::WaitingProfit);
        assert_eq!(position.exit_order_id, Some(exit.order_id));
        assert!(position.is_consistent());
    }

    #[tokio::test]
    async fn test_exit_fill_rearms_when_price_holds() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);
        let notifier = RecordingNotifier::new();

        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        let key = key_of(&engine, 0.9999);
        let old_entry = engine.positions()[&key].entry_order_id.unwrap();
        exchange.fill_order(old_entry).await;
        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        let exit_id = engine.positions()[&key].exit_order_id.unwrap();
        exchange.fill_order(exit_id).await;
        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        // Price (1.0) >= entry (0.9999): level re-arms in place
        let position = &engine.positions()[&key];
        assert_eq!(position.status, PositionStatus::EntryPlaced);
        assert_ne!(position.entry_order_id, Some(old_entry));
        assert_eq!(position.exit_order_id, None);
        assert!(position.is_consistent());

        assert_eq!(notifier.event_count().await, 1);
        let events = notifier.events.lock().await;
        assert_eq!(events[0].0, "Take-profit filled");
    }

    #[tokio::test]
    async fn test_exit_fill_retires_level_when_price_dropped() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);
        let notifier = RecordingNotifier::new();

        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        let key = key_of(&engine, 0.9999);
        let entry_id = engine.positions()[&key].entry_order_id.unwrap();
        exchange.fill_order(entry_id).await;
        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        let exit_id = engine.positions()[&key].exit_order_id.unwrap();
        exchange.fill_order(exit_id).await;
        exchange.set_ticker_price(0.9990).await;
        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        // Price (0.9990) < entry (0.9999): the level is gone and nothing
        // re-armed it (all remaining rungs are above market)
        assert!(!engine.positions().contains_key(&key));
        assert_eq!(notifier.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_placement_leaves_map_unchanged_and_retries() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);

        // First placement (the 1.0000 rung) is rejected
        exchange.fail_next_placements(1);
        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();

        assert_eq!(engine.positions().len(), 4);
        assert!(!engine.positions().contains_key(&key_of(&engine, 1.0)));

        // Next cycle arms the missing rung
        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();
        assert_eq!(engine.positions().len(), 5);
        assert!(engine.positions().contains_key(&key_of(&engine, 1.0)));
    }

    #[tokio::test]
    async fn test_exit_placement_failure_keeps_entry_placed_until_retry() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);

        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();

        let key = key_of(&engine, 0.9998);
        let entry_id = engine.positions()[&key].entry_order_id.unwrap();
        exchange.fill_order(entry_id).await;

        exchange.fail_next_placements(1);
        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();

        // Exit rejected: no optimistic transition
        let position = &engine.positions()[&key];
        assert_eq!(position.status, PositionStatus::EntryPlaced);
        assert_eq!(position.exit_order_id, None);

        // The filled entry is absent from the open snapshot, so the retry
        // goes through the single-order fallback query
        engine
            .reconcile_and_replenish(&exchange, &NoopNotifier)
            .await
            .unwrap();
        let position = &engine.positions()[&key];
        assert_eq!(position.status, PositionStatus::WaitingProfit);
        assert!(exchange.status_calls.load(std::sync::atomic::Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_rearm_failure_falls_back_to_same_cycle_replenish() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);
        let notifier = RecordingNotifier::new();

        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        let key = key_of(&engine, 0.9999);
        let entry_id = engine.positions()[&key].entry_order_id.unwrap();
        exchange.fill_order(entry_id).await;
        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        let exit_id = engine.positions()[&key].exit_order_id.unwrap();
        exchange.fill_order(exit_id).await;

        // The immediate re-entry is rejected; the same cycle's replenish
        // pass re-arms the now-NoOrder level
        exchange.fail_next_placements(1);
        engine
            .reconcile_and_replenish(&exchange, &notifier)
            .await
            .unwrap();

        let position = &engine.positions()[&key];
        assert_eq!(position.status, PositionStatus::EntryPlaced);
        assert!(position.is_consistent());
        assert_eq!(notifier.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_adopts_resting_orders_at_rung_prices() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);

        *exchange.open_orders.lock().await = vec![
            OpenOrder {
                order_id: 500,
                status: OrderState::New,
                side: OrderSide::Buy,
                price: 0.9998,
            },
            OpenOrder {
                order_id: 501,
                status: OrderState::New,
                side: OrderSide::Sell,
                price: 1.0000,
            },
            // Far from any rung: not ours
            OpenOrder {
                order_id: 502,
                status: OrderState::New,
                side: OrderSide::Buy,
                price: 0.95,
            },
        ];

        engine.adopt_open_orders(&exchange).await.unwrap();

        assert_eq!(engine.positions().len(), 2);

        let buy = &engine.positions()[&key_of(&engine, 0.9998)];
        assert_eq!(buy.status, PositionStatus::EntryPlaced);
        assert_eq!(buy.entry_order_id, Some(500));

        // The 1.0000 sell is the take-profit of the 0.9999 rung
        let sell = &engine.positions()[&key_of(&engine, 0.9999)];
        assert_eq!(sell.status, PositionStatus::WaitingProfit);
        assert_eq!(sell.exit_order_id, Some(501));
        assert!(sell.is_consistent());
    }

    #[tokio::test]
    async fn test_cycle_aborts_when_price_fetch_fails() {
        let mut engine = engine();
        let exchange = MockExchange::new(1.0);
        *exchange.fail_ticker.lock().await = true;

        let result = engine.reconcile_and_replenish(&exchange, &NoopNotifier).await;

        assert!(result.is_err());
        assert_eq!(exchange.placed_count().await, 0);
        assert!(engine.positions().is_empty());
    }
}
