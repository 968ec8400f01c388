//! Active grid ledger and fill state machine
//!
//! Per order, per price tick `p`:
//! - LONG:  PENDING → OPEN when `p <= entry`, OPEN → realized when `p >= exit`
//! - SHORT: PENDING → OPEN when `p >= entry`, OPEN → realized when `p <= exit`
//!
//! A realized order goes back to PENDING and may fill again. A tick outside
//! the band tears the whole grid down; open orders are dropped without
//! booking their unrealized PnL.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{FeeSchedule, Grid, OrderState};
use crate::error::LedgerError;
use crate::portfolio::Portfolio;
use crate::{Side, Symbol};

/// One completed entry/exit round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub pair: Symbol,
    pub side: Side,
    pub entry: f64,
    pub exit: f64,
    pub quantity: f64,
    pub gross: f64,
    pub fees: f64,
    pub net: f64,
}

/// What a price tick did to a pair's grid
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Pair has no active grid
    NoGrid,
    /// Price inside the band; zero or more round trips realized
    Filled(Vec<Fill>),
    /// Price left the band; the grid was removed
    TornDown(Grid),
}

#[derive(Debug, Clone)]
pub struct GridLedger {
    capacity: usize,
    fees: FeeSchedule,
    grids: BTreeMap<Symbol, Grid>,
}

impl GridLedger {
    pub fn new(capacity: usize, fees: FeeSchedule) -> Self {
        Self {
            capacity,
            fees,
            grids: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    pub fn has_capacity(&self) -> bool {
        self.grids.len() < self.capacity
    }

    pub fn contains(&self, pair: &Symbol) -> bool {
        self.grids.contains_key(pair)
    }

    pub fn get(&self, pair: &Symbol) -> Option<&Grid> {
        self.grids.get(pair)
    }

    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.grids.values()
    }

    pub fn pairs(&self) -> Vec<Symbol> {
        self.grids.keys().cloned().collect()
    }

    /// Register a freshly built grid
    pub fn insert(&mut self, grid: Grid) -> Result<(), LedgerError> {
        if self.grids.contains_key(&grid.pair) {
            return Err(LedgerError::DuplicateGrid(grid.pair));
        }
        if !self.has_capacity() {
            return Err(LedgerError::CapacityReached(self.capacity));
        }

        info!(
            pair = %grid.pair,
            side = %grid.side,
            orders = grid.orders.len(),
            "Grid registered [{:.4} - {:.4}]",
            grid.price_low,
            grid.price_high
        );
        self.grids.insert(grid.pair.clone(), grid);
        Ok(())
    }

    /// Reload persisted grids, dropping any beyond capacity
    pub fn restore(&mut self, grids: Vec<Grid>) {
        for grid in grids {
            if let Err(e) = self.insert(grid) {
                tracing::warn!("Dropping persisted grid: {}", e);
            }
        }
    }

    pub fn remove(&mut self, pair: &Symbol) -> Option<Grid> {
        self.grids.remove(pair)
    }

    /// Remove grids whose pair is not in `eligible`
    pub fn retain_eligible(&mut self, eligible: &HashSet<Symbol>) -> Vec<Grid> {
        let stale: Vec<Symbol> = self
            .grids
            .keys()
            .filter(|p| !eligible.contains(*p))
            .cloned()
            .collect();
        stale.iter().filter_map(|p| self.grids.remove(p)).collect()
    }

    /// Tear down every grid
    pub fn clear(&mut self) -> Vec<Grid> {
        std::mem::take(&mut self.grids).into_values().collect()
    }

    /// Advance the pair's grid by one price tick, booking fills into `portfolio`
    pub fn apply_tick(
        &mut self,
        pair: &Symbol,
        price: f64,
        portfolio: &mut Portfolio,
    ) -> TickOutcome {
        let Some(grid) = self.grids.get_mut(pair) else {
            return TickOutcome::NoGrid;
        };

        if !grid.contains(price) {
            let open = grid.open_orders();
            info!(
                pair = %pair,
                price,
                abandoned_open_orders = open,
                "Price left band [{:.4} - {:.4}], tearing grid down",
                grid.price_low,
                grid.price_high
            );
            return match self.grids.remove(pair) {
                Some(grid) => TickOutcome::TornDown(grid),
                None => TickOutcome::NoGrid,
            };
        }

        let side = grid.side;
        let mut fills = Vec::new();

        for order in grid.orders.iter_mut() {
            match (order.state, side) {
                (OrderState::Pending, Side::Long) if price <= order.entry => {
                    order.state = OrderState::Open;
                }
                (OrderState::Pending, Side::Short) if price >= order.entry => {
                    order.state = OrderState::Open;
                }
                (OrderState::Open, Side::Long) if price >= order.exit => {
                    order.state = OrderState::Pending;
                    fills.push(self.fees.settle(pair, side, order.entry, order.exit, order.quantity));
                }
                (OrderState::Open, Side::Short) if price <= order.exit => {
                    order.state = OrderState::Pending;
                    fills.push(self.fees.settle(pair, side, order.entry, order.exit, order.quantity));
                }
                _ => {}
            }
        }

        for fill in &fills {
            portfolio.record_realized(fill.net);
            grid.realized_pnl += fill.net;
            grid.fills += 1;
            debug!(
                pair = %pair,
                entry = format!("{:.4}", fill.entry),
                exit = format!("{:.4}", fill.exit),
                net = format!("{:+.4}", fill.net),
                "Grid level realized"
            );
        }

        TickOutcome::Filled(fills)
    }
}

impl FeeSchedule {
    /// Realize one round trip
    fn settle(&self, pair: &Symbol, side: Side, entry: f64, exit: f64, quantity: f64) -> Fill {
        let gross = match side {
            Side::Long => (exit - entry) * quantity,
            Side::Short => (entry - exit) * quantity,
        };
        let fees = self.round_trip(entry, exit, quantity);
        Fill {
            pair: pair.clone(),
            side,
            entry,
            exit,
            quantity,
            gross,
            fees,
            net: gross - fees,
        }
    }
}
