//! Per-symbol grid configuration and ladder math

use serde::Deserialize;

use super::errors::{GridError, GridResult};
use super::types::PriceKey;

/// Immutable per-symbol grid policy
///
/// The ladder is anchored at `base_price` and steps down: rung `i` sits at
/// `base_price - i * price_interval`, rounded to the exchange tick.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolConfig {
    /// Trading pair (e.g. "USDCUSDT")
    pub symbol: String,
    /// Anchor price of the top rung
    pub base_price: f64,
    /// Number of rungs in the ladder
    pub max_orders: u32,
    /// Base-asset quantity per order
    pub order_amount: f64,
    /// Price distance between adjacent rungs
    pub price_interval: f64,
    /// Distance from entry to take-profit
    pub profit_interval: f64,
    /// Decimal places of the exchange tick size
    #[serde(default = "default_tick_precision")]
    pub tick_precision: u32,
}

fn default_tick_precision() -> u32 {
    4
}

impl SymbolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> GridResult<()> {
        if self.symbol.is_empty() {
            return Err(GridError::InvalidConfig("symbol cannot be empty".into()));
        }

        if self.base_price <= 0.0 {
            return Err(GridError::InvalidConfig(
                "base_price must be positive".into(),
            ));
        }

        if self.max_orders == 0 {
            return Err(GridError::InvalidConfig(
                "max_orders must be at least 1".into(),
            ));
        }

        if self.order_amount <= 0.0 {
            return Err(GridError::InvalidConfig(
                "order_amount must be positive".into(),
            ));
        }

        if self.price_interval <= 0.0 || self.profit_interval <= 0.0 {
            return Err(GridError::InvalidConfig(
                "price_interval and profit_interval must be positive".into(),
            ));
        }

        let tick = 10f64.powi(-(self.tick_precision as i32));
        if self.price_interval < tick {
            return Err(GridError::InvalidConfig(format!(
                "price_interval {} is below the tick size {}",
                self.price_interval, tick
            )));
        }

        Ok(())
    }

    /// Round a price to the exchange tick
    pub fn round_price(&self, price: f64) -> f64 {
        self.price_key(price).to_price(self.tick_precision)
    }

    /// Discretize a price into the map key
    pub fn price_key(&self, price: f64) -> PriceKey {
        PriceKey::from_price(price, self.tick_precision)
    }

    /// Entry price of rung `i` (rungs decrease monotonically in `i`)
    pub fn rung_price(&self, i: u32) -> f64 {
        self.round_price(self.base_price - i as f64 * self.price_interval)
    }

    /// Take-profit price for an entry at `entry_price`
    pub fn exit_price(&self, entry_price: f64) -> f64 {
        self.round_price(entry_price + self.profit_interval)
    }

    /// Lowest rung the treasury keeps funded: rungs at or below
    /// `base_price - balance_buffer * price_interval` stay unarmed
    pub fn floor_key(&self, balance_buffer: u32) -> PriceKey {
        self.price_key(self.base_price - balance_buffer as f64 * self.price_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_config_validation() {
        assert!(usdc_config().validate().is_ok());

        let mut config = usdc_config();
        config.max_orders = 0;
        assert!(config.validate().is_err());

        let mut config = usdc_config();
        config.order_amount = 0.0;
        assert!(config.validate().is_err());

        let mut config = usdc_config();
        config.price_interval = 0.00001; // below the 4-decimal tick
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rung_prices_strictly_decreasing() {
        let config = usdc_config();
        let prices: Vec<f64> = (0..config.max_orders).map(|i| config.rung_price(i)).collect();

        assert!((prices[0] - 1.0).abs() < 1e-9);
        assert!((prices[6] - 0.9994).abs() < 1e-9);
        for w in prices.windows(2) {
            assert!(w[1] < w[0]);
        }
    }

    #[test]
    fn test_rung_prices_land_on_exact_keys() {
        // base - i*interval accumulates binary drift; the rounded rung must
        // still key identically to the nominal decimal
        let config = usdc_config();
        for i in 0..config.max_orders {
            let nominal = (10_000 - i as i64) as f64 / 10_000.0;
            assert_eq!(config.price_key(config.rung_price(i)), config.price_key(nominal));
        }
    }

    #[test]
    fn test_exit_price() {
        let config = usdc_config();
        assert!((config.exit_price(0.9994) - 0.9995).abs() < 1e-9);
    }

    #[test]
    fn test_floor_key() {
        let config = usdc_config();
        // buffer of 5 intervals below a 1.0 base -> 0.9995
        assert_eq!(config.floor_key(5), config.price_key(0.9995));
    }
}
