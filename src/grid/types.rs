//! Core data types for the price grid

use std::fmt;

/// A price discretized to the exchange's tick size, stored as scaled ticks.
///
/// Used as the position-map key and for every comparison that decides level
/// identity. Two floats that drift within one tick of each other map to the
/// same key, so representation noise cannot orphan a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceKey(i64);

impl PriceKey {
    /// Discretize a price at the given tick precision (decimal places)
    pub fn from_price(price: f64, tick_precision: u32) -> Self {
        let scale = 10f64.powi(tick_precision as i32);
        Self((price * scale).round() as i64)
    }

    /// Convert back to a float price
    pub fn to_price(self, tick_precision: u32) -> f64 {
        self.0 as f64 / 10f64.powi(tick_precision as i32)
    }

    /// Raw tick count
    pub fn ticks(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

/// Lifecycle state of one grid level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    /// No resting order at this level
    NoOrder,
    /// Entry buy is resting, waiting for a fill
    EntryPlaced,
    /// Entry filled, take-profit sell is resting
    WaitingProfit,
}

/// Mutable per-level order state, keyed by entry price in the position map
///
/// Status and order ids move together: `EntryPlaced` carries an entry id and
/// no exit id, `WaitingProfit` carries both.
#[derive(Debug, Clone)]
pub struct GridPosition {
    /// Resting (or last) entry order id
    pub entry_order_id: Option<u64>,
    /// Resting take-profit order id
    pub exit_order_id: Option<u64>,
    /// Current lifecycle state
    pub status: PositionStatus,
    /// Tick-rounded entry price
    pub entry_price: f64,
    /// Tick-rounded take-profit price
    pub exit_price: f64,
}

impl GridPosition {
    /// Create a fresh entry position for a newly placed buy order
    pub fn entry_placed(entry_order_id: u64, entry_price: f64, exit_price: f64) -> Self {
        Self {
            entry_order_id: Some(entry_order_id),
            exit_order_id: None,
            status: PositionStatus::EntryPlaced,
            entry_price,
            exit_price,
        }
    }

    /// Create a position adopted from a resting take-profit order.
    ///
    /// After a restart the original entry id is unrecoverable, so the
    /// observed exit id stands in for both fields; only the exit id is
    /// consulted while in `WaitingProfit`.
    pub fn adopted_exit(exit_order_id: u64, entry_price: f64, exit_price: f64) -> Self {
        Self {
            entry_order_id: Some(exit_order_id),
            exit_order_id: Some(exit_order_id),
            status: PositionStatus::WaitingProfit,
            entry_price,
            exit_price,
        }
    }

    /// Transition to `WaitingProfit` after the entry filled and the exit
    /// order was placed
    pub fn mark_waiting_profit(&mut self, exit_order_id: u64) {
        self.exit_order_id = Some(exit_order_id);
        self.status = PositionStatus::WaitingProfit;
    }

    /// Clear both order ids after the take-profit filled, leaving the level
    /// eligible for re-arming
    pub fn reset(&mut self) {
        self.entry_order_id = None;
        self.exit_order_id = None;
        self.status = PositionStatus::NoOrder;
    }

    /// Re-arm the level in place with a fresh entry order
    pub fn rearm(&mut self, entry_order_id: u64) {
        self.entry_order_id = Some(entry_order_id);
        self.exit_order_id = None;
        self.status = PositionStatus::EntryPlaced;
    }

    /// Check the status/id consistency invariant
    pub fn is_consistent(&self) -> bool {
        match self.status {
            PositionStatus::NoOrder => {
                self.entry_order_id.is_none() && self.exit_order_id.is_none()
            }
            PositionStatus::EntryPlaced => {
                self.entry_order_id.is_some() && self.exit_order_id.is_none()
            }
            PositionStatus::WaitingProfit => {
                self.entry_order_id.is_some() && self.exit_order_id.is_some()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_key_absorbs_float_drift() {
        // 0.1 + 0.2 != 0.3 in binary, but both land on the same key
        let a = PriceKey::from_price(0.1 + 0.2, 4);
        let b = PriceKey::from_price(0.3, 4);
        assert_eq!(a, b);
        assert_eq!(a.ticks(), 3000);

        let c = PriceKey::from_price(1.0 - 3.0 * 0.0001, 4);
        let d = PriceKey::from_price(0.9997, 4);
        assert_eq!(c, d);
    }

    #[test]
    fn test_price_key_round_trip() {
        let key = PriceKey::from_price(0.9994, 4);
        assert!((key.to_price(4) - 0.9994).abs() < 1e-9);
    }

    #[test]
    fn test_position_lifecycle_consistency() {
        let mut pos = GridPosition::entry_placed(1, 0.9999, 1.0000);
        assert_eq!(pos.status, PositionStatus::EntryPlaced);
        assert!(pos.is_consistent());

        pos.mark_waiting_profit(2);
        assert_eq!(pos.status, PositionStatus::WaitingProfit);
        assert_eq!(pos.exit_order_id, Some(2));
        assert!(pos.is_consistent());

        pos.reset();
        assert_eq!(pos.status, PositionStatus::NoOrder);
        assert!(pos.is_consistent());

        pos.rearm(3);
        assert_eq!(pos.status, PositionStatus::EntryPlaced);
        assert_eq!(pos.entry_order_id, Some(3));
        assert_eq!(pos.exit_order_id, None);
        assert!(pos.is_consistent());
    }

    #[test]
    fn test_adopted_exit_keeps_invariant() {
        let pos = GridPosition::adopted_exit(42, 0.9998, 0.9999);
        assert_eq!(pos.status, PositionStatus::WaitingProfit);
        assert!(pos.is_consistent());
    }
}
