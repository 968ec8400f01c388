//! Grid construction and profitability screening
//!
//! ## How it works:
//! 1. Pick levels and ATR multiplier from the level policy
//! 2. Band = price ± ATR × multiplier, split into equal steps
//! 3. LONG levels climb from the low bound (buy low, sell one step up),
//!    SHORT levels descend from the high bound (sell high, cover one step down)
//! 4. Every level gets the same quantity: margin × leverage / price / levels
//! 5. Drop levels below the minimum notional or minimum net PnL;
//!    fewer than three survivors rejects the grid

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{FeeSchedule, Grid, GridOrder, OrderState};
use crate::config::AccountConfig;
use crate::error::ScanError;
use crate::{Side, Symbol};

/// A grid with fewer surviving orders than this is never created
pub const MIN_GRID_ORDERS: usize = 3;

/// Inputs for one grid attempt
#[derive(Debug, Clone)]
pub struct GridRequest {
    pub pair: Symbol,
    pub side: Side,
    pub price: f64,
    pub atr: f64,
    pub atr_pct: f64,
    pub now: DateTime<Utc>,
}

/// Result of a build attempt plus the order counters it produced
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub result: Result<Grid, ScanError>,
    /// Candidate orders considered
    pub candidates: usize,
    /// Candidates dropped by the screen
    pub filtered: usize,
}

#[derive(Debug, Clone)]
pub struct GridBuilder {
    account: AccountConfig,
    fees: FeeSchedule,
}

impl GridBuilder {
    pub fn new(account: AccountConfig, fees: FeeSchedule) -> Self {
        Self { account, fees }
    }

    /// Minimum expected net PnL an order must clear at this volatility
    pub fn min_expected_pnl(&self, atr_pct: f64) -> f64 {
        self.account
            .min_expected_pnl
            .max(atr_pct * self.account.atr_pnl_factor)
    }

    /// Quantity per order for a grid of `levels` at `price`
    pub fn order_quantity(&self, price: f64, levels: usize) -> f64 {
        let notional = self.account.deposit * self.account.margin_per_grid * self.account.leverage;
        (notional / price) / levels as f64
    }

    pub fn build(&self, req: &GridRequest) -> BuildOutcome {
        let (levels, multiplier) = self.account.level_policy.resolve(req.atr_pct);
        let range = req.atr * multiplier;

        if levels == 0 || req.price <= 0.0 || range <= 0.0 || !range.is_finite() {
            return BuildOutcome {
                result: Err(ScanError::GridRejected {
                    survivors: 0,
                    atr_pct: req.atr_pct,
                }),
                candidates: 0,
                filtered: 0,
            };
        }

        let price_low = req.price - range;
        let price_high = req.price + range;
        let step = (price_high - price_low) / levels as f64;
        let quantity = self.order_quantity(req.price, levels);
        let min_pnl = self.min_expected_pnl(req.atr_pct);

        let mut orders = Vec::with_capacity(levels);
        let mut filtered = 0;

        for i in 0..levels {
            let (entry, exit) = match req.side {
                Side::Long => {
                    let entry = price_low + step * i as f64;
                    (entry, entry + step)
                }
                Side::Short => {
                    let entry = price_high - step * i as f64;
                    (entry, entry - step)
                }
            };

            let order = GridOrder {
                entry,
                exit,
                quantity,
                state: OrderState::Pending,
            };

            if order.notional() < self.account.min_order_notional
                || order.expected_net(&self.fees) < min_pnl
            {
                filtered += 1;
                continue;
            }
            orders.push(order);
        }

        let result = if orders.len() < MIN_GRID_ORDERS {
            debug!(
                pair = %req.pair,
                survivors = orders.len(),
                min_pnl = format!("{:.4}", min_pnl),
                "Grid rejected by profitability screen"
            );
            Err(ScanError::GridRejected {
                survivors: orders.len(),
                atr_pct: req.atr_pct,
            })
        } else {
            debug!(
                pair = %req.pair,
                side = %req.side,
                low = format!("{:.4}", price_low),
                high = format!("{:.4}", price_high),
                levels,
                orders = orders.len(),
                "Built grid"
            );
            Ok(Grid {
                pair: req.pair.clone(),
                side: req.side,
                price_low,
                price_high,
                atr: req.atr,
                orders,
                created_at: req.now,
                realized_pnl: 0.0,
                fills: 0,
            })
        };

        BuildOutcome {
            result,
            candidates: levels,
            filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LevelPolicy;
    use approx::assert_relative_eq;

    fn fixed_account(levels: usize, multiplier: f64) -> AccountConfig {
        AccountConfig {
            level_policy: LevelPolicy::Fixed { levels, multiplier },
            ..AccountConfig::default()
        }
    }

    fn request(side: Side, price: f64, atr: f64) -> GridRequest {
        GridRequest {
            pair: Symbol::new("BTCUSDT"),
            side,
            price,
            atr,
            atr_pct: atr / price * 100.0,
            now: Utc::now(),
        }
    }

    fn builder(account: AccountConfig) -> GridBuilder {
        GridBuilder::new(account, FeeSchedule::new(0.0002, 0.0004))
    }

    #[test]
    fn test_quantity_from_deposit_leverage_margin() {
        // deposit 100 × margin 0.10 × leverage 10 = 100 notional
        let b = builder(fixed_account(8, 2.5));
        assert_relative_eq!(b.order_quantity(250.0, 8), (100.0 / 250.0) / 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_long_grid_layout() {
        let b = builder(fixed_account(8, 2.5));
        let grid = b.build(&request(Side::Long, 100.0, 2.0)).result.unwrap();

        assert_relative_eq!(grid.price_low, 95.0, epsilon = 1e-9);
        assert_relative_eq!(grid.price_high, 105.0, epsilon = 1e-9);
        assert_eq!(grid.orders.len(), 8);
        assert_relative_eq!(grid.orders[0].entry, 95.0, epsilon = 1e-9);
        assert_relative_eq!(grid.orders[0].exit, 96.25, epsilon = 1e-9);
        assert_relative_eq!(grid.orders[7].exit, 105.0, epsilon = 1e-9);
        for o in &grid.orders {
            assert!(o.entry < o.exit);
            assert_relative_eq!(o.quantity, (100.0 / 100.0) / 8.0, epsilon = 1e-9);
            assert_eq!(o.state, OrderState::Pending);
        }
    }

    #[test]
    fn test_short_grid_descends_from_high_bound() {
        let b = builder(fixed_account(8, 2.5));
        let grid = b.build(&request(Side::Short, 100.0, 2.0)).result.unwrap();

        assert_relative_eq!(grid.price_low, 95.0, epsilon = 1e-9);
        assert_relative_eq!(grid.price_high, 105.0, epsilon = 1e-9);
        assert_relative_eq!(grid.orders[0].entry, 105.0, epsilon = 1e-9);
        assert_relative_eq!(grid.orders[0].exit, 103.75, epsilon = 1e-9);
        for o in &grid.orders {
            assert!(o.entry > o.exit);
        }
    }

    #[test]
    fn test_tiered_policy_picks_levels_by_volatility() {
        let b = builder(AccountConfig::default());
        // atr_pct = 1.0 -> 6 levels, 1.8x
        let grid = b.build(&request(Side::Long, 100.0, 1.0)).result.unwrap();
        assert_eq!(grid.orders.len(), 6);
        assert_relative_eq!(grid.price_high - grid.price_low, 3.6, epsilon = 1e-9);
    }

    #[test]
    fn test_tiny_atr_rejects_whole_grid() {
        let b = builder(fixed_account(8, 2.5));
        let outcome = b.build(&request(Side::Long, 100.0, 0.01));
        assert_eq!(outcome.candidates, 8);
        assert_eq!(outcome.filtered, 8);
        assert!(matches!(
            outcome.result,
            Err(ScanError::GridRejected { survivors: 0, .. })
        ));
    }

    #[test]
    fn test_min_notional_filters_orders() {
        let account = AccountConfig {
            min_order_notional: 50.0,
            ..fixed_account(8, 2.5)
        };
        let outcome = builder(account).build(&request(Side::Long, 100.0, 2.0));
        // every order is ~12.5 notional
        assert_eq!(outcome.filtered, 8);
        assert!(outcome.result.is_err());
    }

    #[test]
    fn test_zero_atr_is_rejected() {
        let b = builder(fixed_account(8, 2.5));
        let outcome = b.build(&request(Side::Long, 100.0, 0.0));
        assert!(outcome.result.is_err());
        assert_eq!(outcome.candidates, 0);
    }

    #[test]
    fn test_survivors_satisfy_screen() {
        let account = fixed_account(10, 3.5);
        let b = builder(account.clone());
        let fees = FeeSchedule::new(0.0002, 0.0004);
        for atr in [0.3, 0.5, 1.0, 2.0, 4.0] {
            let req = request(Side::Long, 100.0, atr);
            let outcome = b.build(&req);
            assert_eq!(outcome.candidates, 10);
            if let Ok(grid) = outcome.result {
                assert!(grid.orders.len() >= MIN_GRID_ORDERS);
                assert_eq!(grid.orders.len() + outcome.filtered, 10);
                for o in &grid.orders {
                    assert!(o.notional() >= account.min_order_notional);
                    assert!(o.expected_net(&fees) >= b.min_expected_pnl(req.atr_pct));
                }
            }
        }
    }

    #[test]
    fn test_dynamic_min_pnl_scales_with_atr() {
        let b = builder(AccountConfig::default());
        assert_relative_eq!(b.min_expected_pnl(0.5), 0.02, epsilon = 1e-9);
        assert_relative_eq!(b.min_expected_pnl(5.0), 0.05, epsilon = 1e-9);

        let b = builder(AccountConfig {
            atr_pnl_factor: 0.0,
            ..AccountConfig::default()
        });
        assert_relative_eq!(b.min_expected_pnl(5.0), 0.02, epsilon = 1e-9);
    }
}
