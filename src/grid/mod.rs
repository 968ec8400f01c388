//! Price grids
//!
//! A grid is a band `[price_low, price_high]` split into levels, each level
//! carrying one reusable entry/exit order pair. [`GridBuilder`] decides the
//! band and screens the orders, [`GridLedger`] owns the live grids and runs
//! the fill state machine.

mod builder;
mod ledger;

pub use builder::{BuildOutcome, GridBuilder, GridRequest, MIN_GRID_ORDERS};
pub use ledger::{Fill, GridLedger, TickOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Side, Symbol};

/// Maker/taker fee rates. Entries rest on the book (maker), exits are
/// assumed to cross (taker).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker: f64,
    pub taker: f64,
}

impl FeeSchedule {
    pub fn new(maker: f64, taker: f64) -> Self {
        Self { maker, taker }
    }

    /// Round-trip fees for one fill of `quantity` from `entry` to `exit`
    pub fn round_trip(&self, entry: f64, exit: f64, quantity: f64) -> f64 {
        entry * quantity * self.maker + exit * quantity * self.taker
    }
}

/// Fill state of a single grid level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    /// Waiting for price to reach the entry
    #[default]
    Pending,
    /// Entry filled, waiting for the exit
    Open,
}

/// One level of a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOrder {
    pub entry: f64,
    pub exit: f64,
    pub quantity: f64,
    #[serde(default)]
    pub state: OrderState,
}

impl GridOrder {
    pub fn notional(&self) -> f64 {
        self.entry * self.quantity
    }

    /// Price-move PnL of one round trip before fees
    pub fn gross(&self) -> f64 {
        (self.exit - self.entry).abs() * self.quantity
    }

    /// Round-trip PnL after fees
    pub fn expected_net(&self, fees: &FeeSchedule) -> f64 {
        self.gross() - fees.round_trip(self.entry, self.exit, self.quantity)
    }
}

/// An active grid on one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub pair: Symbol,
    pub side: Side,
    pub price_low: f64,
    pub price_high: f64,
    /// ATR the band was sized from
    pub atr: f64,
    pub orders: Vec<GridOrder>,
    pub created_at: DateTime<Utc>,
    /// Net PnL realized by this grid so far
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub fills: u64,
}

impl Grid {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.price_low && price <= self.price_high
    }

    pub fn open_orders(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| o.state == OrderState::Open)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_trip_fees() {
        let fees = FeeSchedule::new(0.0002, 0.0004);
        // 100*1*0.0002 + 101*1*0.0004
        assert_relative_eq!(fees.round_trip(100.0, 101.0, 1.0), 0.0604, epsilon = 1e-9);
    }

    #[test]
    fn test_expected_net_is_direction_agnostic() {
        let fees = FeeSchedule::new(0.0, 0.0);
        let long = GridOrder {
            entry: 100.0,
            exit: 101.0,
            quantity: 2.0,
            state: OrderState::Pending,
        };
        let short = GridOrder {
            entry: 101.0,
            exit: 100.0,
            ..long.clone()
        };
        assert_relative_eq!(long.expected_net(&fees), 2.0, epsilon = 1e-9);
        assert_relative_eq!(short.expected_net(&fees), 2.0, epsilon = 1e-9);
    }
}
