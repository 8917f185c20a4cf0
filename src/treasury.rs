//! Treasury sizing and sweep between the trading balance and the yield product
//!
//! Capital parked in the flexible yield product earns passive return but
//! cannot post limit orders. The manager keeps exactly enough liquid to cover
//! every grid's worst-case open-order exposure plus a safety buffer, and
//! sweeps the rest to yield.

use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::exchange::SpotExchange;
use crate::grid::{GridResult, SymbolConfig};
use crate::notify::Notifier;

/// Minimum spacing between sufficiency checks
const SUFFICIENCY_INTERVAL: Duration = Duration::from_secs(30);

/// Redemption overshoot so the next check does not thrash around the target
const REDEEM_OVERSHOOT: f64 = 1.1;

/// Share of a surplus swept to yield; the rest stays as working buffer
const DEPOSIT_RATIO: f64 = 0.9;

/// Treasury policy
#[derive(Debug, Clone, Deserialize)]
pub struct TreasuryConfig {
    /// Quote asset funding every grid (e.g. "USDT")
    pub quote_asset: String,
    /// Flexible yield product holding idle capital
    pub product_id: String,
    /// Intervals of extra headroom reserved below each symbol's live price
    #[serde(default = "default_balance_buffer")]
    pub balance_buffer: u32,
    /// UTC hour of day during which surplus deposits may run
    #[serde(default)]
    pub deposit_hour_utc: u32,
}

fn default_balance_buffer() -> u32 {
    5
}

/// Cross-symbol treasury manager
///
/// Owns no grid state: it reads the symbol configs and live prices, and
/// moves quote balance between trading and yield.
pub struct BalanceManager {
    symbols: Vec<SymbolConfig>,
    config: TreasuryConfig,
    last_sufficiency: Option<Instant>,
    last_surplus_sweep: Option<DateTime<Utc>>,
}

impl BalanceManager {
    /// Create a manager over the configured symbols
    pub fn new(symbols: Vec<SymbolConfig>, config: TreasuryConfig) -> Self {
        Self {
            symbols,
            config,
            last_sufficiency: None,
            last_surplus_sweep: None,
        }
    }

    /// One scheduler tick: run whichever sub-duties are due.
    ///
    /// The sufficiency sweep runs at most every 30s; the surplus sweep only
    /// during the configured UTC hour and at most once per hour. Redeem and
    /// deposit failures are logged and notified, never fatal: the next tick
    /// recomputes everything from scratch.
    pub async fn manage_balance<E, N>(&mut self, exchange: &E, notifier: &N) -> GridResult<()>
    where
        E: SpotExchange,
        N: Notifier,
    {
        if self.sufficiency_due() {
            self.last_sufficiency = Some(Instant::now());
            self.sufficiency_sweep(exchange, notifier).await?;
        }

        let now = Utc::now();
        if self.deposit_window_open(now) {
            self.last_surplus_sweep = Some(now);
            self.surplus_sweep(exchange, notifier).await?;
        }

        Ok(())
    }

    fn sufficiency_due(&self) -> bool {
        self.last_sufficiency
            .map_or(true, |t| t.elapsed() >= SUFFICIENCY_INTERVAL)
    }

    /// Whether the surplus sweep may run at `now`
    fn deposit_window_open(&self, now: DateTime<Utc>) -> bool {
        if now.hour() != self.config.deposit_hour_utc {
            return false;
        }
        self.last_surplus_sweep
            .map_or(true, |t| now.signed_duration_since(t) >= chrono::Duration::hours(1))
    }

    /// Quote balance every grid needs liquid, summed across symbols.
    ///
    /// Symbols trading at or above their base price reserve nothing. A
    /// failed price fetch fails safe to the full worst case rather than
    /// under-reserving.
    async fn required_balance<E: SpotExchange>(&self, exchange: &E) -> f64 {
        let mut required = 0.0;

        for cfg in &self.symbols {
            let worst_case = cfg.max_orders as f64 * cfg.order_amount * cfg.base_price;

            match exchange.get_ticker_price(&cfg.symbol).await {
                Ok(price) if price >= cfg.base_price => {
                    debug!(
                        "{}: trading at {} (>= base {}), nothing reserved",
                        cfg.symbol, price, cfg.base_price
                    );
                }
                Ok(price) => {
                    let intervals = ((cfg.base_price - price) / cfg.price_interval).max(0.0);
                    let funded = (intervals + self.config.balance_buffer as f64)
                        .min(cfg.max_orders as f64)
                        .ceil();
                    required += funded * cfg.order_amount * cfg.base_price;
                }
                Err(e) => {
                    warn!(
                        "{}: price fetch failed, reserving worst case {}: {}",
                        cfg.symbol, worst_case, e
                    );
                    required += worst_case;
                }
            }
        }

        required
    }

    /// Redeem from yield when the trading balance cannot cover the grids
    async fn sufficiency_sweep<E, N>(&self, exchange: &E, notifier: &N) -> GridResult<()>
    where
        E: SpotExchange,
        N: Notifier,
    {
        let current = exchange
            .get_account_balance(&self.config.quote_asset)
            .await?
            .total();
        let required = self.required_balance(exchange).await;

        debug!(
            "Sufficiency check: balance={:.4} {} required={:.4}",
            current, self.config.quote_asset, required
        );

        if current >= required {
            return Ok(());
        }

        let amount = (required - current) * REDEEM_OVERSHOOT;
        info!(
            "Redeeming {:.4} {} from savings (balance {:.4} < required {:.4})",
            amount, self.config.quote_asset, current, required
        );

        match exchange.redeem_savings(&self.config.product_id, amount).await {
            Ok(()) => {
                notifier
                    .send(
                        "Savings redeemed",
                        &format!(
                            "Redeemed {:.4} {} to cover grid exposure (required {:.4})",
                            amount, self.config.quote_asset, required
                        ),
                    )
                    .await;
            }
            Err(e) => {
                warn!("Savings redemption failed: {e}");
                notifier
                    .send(
                        "Savings redemption failed",
                        &format!("Could not redeem {:.4} {}: {}", amount, self.config.quote_asset, e),
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Deposit idle balance into yield during the configured window
    async fn surplus_sweep<E, N>(&self, exchange: &E, notifier: &N) -> GridResult<()>
    where
        E: SpotExchange,
        N: Notifier,
    {
        let current = exchange
            .get_account_balance(&self.config.quote_asset)
            .await?
            .total();
        let required = self.required_balance(exchange).await;

        if current <= required {
            debug!(
                "No surplus to sweep: balance={:.4} required={:.4}",
                current, required
            );
            return Ok(());
        }

        let amount = (current - required) * DEPOSIT_RATIO;
        info!(
            "Depositing {:.4} {} surplus into savings (balance {:.4} > required {:.4})",
            amount, self.config.quote_asset, current, required
        );

        match exchange.deposit_savings(&self.config.product_id, amount).await {
            Ok(()) => {
                notifier
                    .send(
                        "Savings deposit",
                        &format!(
                            "Deposited {:.4} {} of idle balance into savings",
                            amount, self.config.quote_asset
                        ),
                    )
                    .await;
            }
            Err(e) => {
                warn!("Savings deposit failed: {e}");
                notifier
                    .send(
                        "Savings deposit failed",
                        &format!("Could not deposit {:.4} {}: {}", amount, self.config.quote_asset, e),
                    )
                    .await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::traits::mock::MockExchange;
    use crate::exchange::AssetBalance;
    use crate::notify::mock::RecordingNotifier;
    use crate::notify::NoopNotifier;
    use chrono::TimeZone;

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

    fn manager_with_deposit_hour(deposit_hour_utc: u32) -> BalanceManager {
        BalanceManager::new(
            vec![usdc_config()],
            TreasuryConfig {
                quote_asset: "USDT".to_string(),
                product_id: "USDT001".to_string(),
                balance_buffer: 5,
                deposit_hour_utc,
            },
        )
    }

    fn manager() -> BalanceManager {
        // Keep the deposit window far from the wall clock so manage_balance
        // tests only exercise the sufficiency path
        manager_with_deposit_hour((Utc::now().hour() + 12) % 24)
    }

    #[tokio::test]
    async fn test_required_balance_worked_example() {
        // 6 intervals below base, buffer 5, capped at max_orders 10:
        // 10 * 10 * 1.0 = 100
        let manager = manager();
        let exchange = MockExchange::new(0.9994);

        let required = manager.required_balance(&exchange).await;
        assert!((required - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_required_balance_skips_symbols_at_or_above_base() {
        let manager = manager();
        let exchange = MockExchange::new(1.0001);

        let required = manager.required_balance(&exchange).await;
        assert_eq!(required, 0.0);
    }

    #[tokio::test]
    async fn test_required_balance_fails_safe_on_price_error() {
        let manager = manager();
        let exchange = MockExchange::new(1.0);
        *exchange.fail_ticker.lock().await = true;

        // Worst case: max_orders * order_amount * base_price
        let required = manager.required_balance(&exchange).await;
        assert!((required - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_shortfall_redeems_with_overshoot() {
        let mut manager = manager();
        let exchange = MockExchange::new(0.9994);
        *exchange.balance.lock().await = AssetBalance { free: 30.0, locked: 50.0 };
        let notifier = RecordingNotifier::new();

        manager.manage_balance(&exchange, &notifier).await.unwrap();

        // required 100, balance 80: redeem (100 - 80) * 1.1 = 22
        let redeemed = exchange.redeemed.lock().await;
        assert_eq!(redeemed.len(), 1);
        assert!((redeemed[0] - 22.0).abs() < 1e-9);

        let events = notifier.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "Savings redeemed");
    }

    #[tokio::test]
    async fn test_no_redeem_when_balance_covers_requirement() {
        let mut manager = manager();
        let exchange = MockExchange::new(0.9994);
        *exchange.balance.lock().await = AssetBalance { free: 150.0, locked: 0.0 };

        manager.manage_balance(&exchange, &NoopNotifier).await.unwrap();

        assert!(exchange.redeemed.lock().await.is_empty());
        // Outside the deposit window nothing is swept either
        assert!(exchange.deposited.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sufficiency_check_is_time_gated() {
        let mut manager = manager();
        let exchange = MockExchange::new(0.9994);
        *exchange.balance.lock().await = AssetBalance { free: 150.0, locked: 0.0 };

        manager.manage_balance(&exchange, &NoopNotifier).await.unwrap();
        let calls_after_first = exchange
            .ticker_calls
            .load(std::sync::atomic::Ordering::SeqCst);

        // Immediately after, the 30s gate suppresses the second check
        manager.manage_balance(&exchange, &NoopNotifier).await.unwrap();
        assert_eq!(
            exchange.ticker_calls.load(std::sync::atomic::Ordering::SeqCst),
            calls_after_first
        );
    }

    #[tokio::test]
    async fn test_surplus_sweep_deposits_working_share() {
        let manager = manager();
        let exchange = MockExchange::new(0.9994);
        *exchange.balance.lock().await = AssetBalance { free: 200.0, locked: 0.0 };
        let notifier = RecordingNotifier::new();

        manager.surplus_sweep(&exchange, &notifier).await.unwrap();

        // surplus 100: deposit 100 * 0.9 = 90
        let deposited = exchange.deposited.lock().await;
        assert_eq!(deposited.len(), 1);
        assert!((deposited[0] - 90.0).abs() < 1e-9);

        let events = notifier.events.lock().await;
        assert_eq!(events[0].0, "Savings deposit");
    }

    #[tokio::test]
    async fn test_surplus_sweep_skips_without_surplus() {
        let manager = manager();
        let exchange = MockExchange::new(0.9994);
        *exchange.balance.lock().await = AssetBalance { free: 100.0, locked: 0.0 };

        manager.surplus_sweep(&exchange, &NoopNotifier).await.unwrap();

        assert!(exchange.deposited.lock().await.is_empty());
    }

    #[test]
    fn test_deposit_window_gating() {
        let mut manager = manager_with_deposit_hour(2);

        let in_window = Utc.with_ymd_and_hms(2024, 3, 1, 2, 15, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();

        assert!(manager.deposit_window_open(in_window));
        assert!(!manager.deposit_window_open(outside));

        // A sweep 20 minutes ago inside the same hour closes the window
        manager.last_surplus_sweep = Some(Utc.with_ymd_and_hms(2024, 3, 1, 1, 55, 0).unwrap());
        assert!(!manager.deposit_window_open(in_window));

        // A sweep from the previous day's window does not
        manager.last_surplus_sweep = Some(Utc.with_ymd_and_hms(2024, 2, 29, 2, 15, 0).unwrap());
        assert!(manager.deposit_window_open(in_window));
    }
}
