//! Grid engine aggregate
//!
//! Owns the ledger, portfolio and risk controller and is the only place
//! they are mutated. One call to [`Engine::run_cycle`] applies a full scan
//! cycle against market data the caller has already fetched, so capacity
//! decisions never race with in-flight requests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analyzer::PairAnalyzer;
use crate::config::Config;
use crate::error::ScanError;
use crate::grid::{FeeSchedule, Fill, Grid, GridBuilder, GridLedger, GridRequest, TickOutcome};
use crate::portfolio::Portfolio;
use crate::risk::{RiskController, RiskEvent, RiskMode};
use crate::selector::{eligible_pairs, PairSelector};
use crate::state_store::{Snapshot, StateStore, SNAPSHOT_VERSION};
use crate::{Candle, PairStatus, Side, Symbol};

/// Market data gathered for one cycle
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    /// Candle windows for analysis and selection, oldest first
    pub candles: HashMap<Symbol, Vec<Candle>>,
    /// Latest price per pair with an active grid
    pub prices: HashMap<Symbol, f64>,
}

/// Last scan result for a pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairState {
    pub status: PairStatus,
    pub reason: String,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCounters {
    pub grids_started: u64,
    pub grids_rejected: u64,
    pub grids_closed: u64,
    pub orders_total: u64,
    pub orders_filtered: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Price left the band
    OutOfBand,
    /// Pair no longer eligible
    Disabled,
    /// Risk controller left ACTIVE
    RiskHalt,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::OutOfBand => write!(f, "price left band"),
            CloseReason::Disabled => write!(f, "pair disabled"),
            CloseReason::RiskHalt => write!(f, "risk halt"),
        }
    }
}

/// Something that happened during a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    GridOpened {
        pair: Symbol,
        side: Side,
        price_low: f64,
        price_high: f64,
        orders: usize,
    },
    GridClosed {
        pair: Symbol,
        reason: CloseReason,
        realized_pnl: f64,
        abandoned_open_orders: usize,
    },
    Filled(Fill),
    Risk(RiskEvent),
}

impl EngineEvent {
    /// Events an operator should be told about
    pub fn is_notable(&self) -> bool {
        !matches!(self, EngineEvent::Filled(_))
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::GridOpened {
                pair,
                side,
                price_low,
                price_high,
                orders,
            } => write!(
                f,
                "Grid opened {} {} [{:.4} - {:.4}] orders {}",
                pair, side, price_low, price_high, orders
            ),
            EngineEvent::GridClosed {
                pair,
                reason,
                realized_pnl,
                abandoned_open_orders,
            } => write!(
                f,
                "Grid closed {} ({}) | realized {:+.4} | abandoned open {}",
                pair, reason, realized_pnl, abandoned_open_orders
            ),
            EngineEvent::Filled(fill) => write!(
                f,
                "{} {} {:.4} -> {:.4} net {:+.4}",
                fill.pair, fill.side, fill.entry, fill.exit, fill.net
            ),
            EngineEvent::Risk(e) => write!(f, "{}", e),
        }
    }
}

/// Aggregate view for operators
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub active_grids: usize,
    pub capacity: usize,
    pub counters: EngineCounters,
    pub equity: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    pub deal_count: u64,
    pub max_drawdown: f64,
    pub drawdown: f64,
    pub mode: RiskMode,
    pub pairs: Vec<(Symbol, PairState)>,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 GRID BOT - CONTROL PANEL")?;
        writeln!(f)?;
        writeln!(f, "Mode: {}", self.mode)?;
        writeln!(f, "Active grids: {}/{}", self.active_grids, self.capacity)?;
        writeln!(f, "Grids started: {}", self.counters.grids_started)?;
        writeln!(f, "Grids rejected: {}", self.counters.grids_rejected)?;
        writeln!(f, "Grids closed: {}", self.counters.grids_closed)?;
        writeln!(f)?;
        writeln!(f, "Orders total: {}", self.counters.orders_total)?;
        writeln!(f, "Orders filtered: {}", self.counters.orders_filtered)?;
        writeln!(f)?;
        writeln!(f, "Equity: {:.4}", self.equity)?;
        writeln!(
            f,
            "PnL total/day/week: {:+.4} / {:+.4} / {:+.4}",
            self.total_pnl, self.daily_pnl, self.weekly_pnl
        )?;
        writeln!(f, "Deals: {}", self.deal_count)?;
        writeln!(
            f,
            "Drawdown: {:.2}% (max {:.2}%)",
            self.drawdown, self.max_drawdown
        )?;
        writeln!(f)?;
        write!(f, "Pairs:")?;
        for (pair, state) in &self.pairs {
            let reason = if state.reason.is_empty() { "-" } else { &state.reason };
            write!(f, "\n• {}: {} | {}", pair, state.status, reason)?;
        }
        Ok(())
    }
}

pub struct Engine {
    analyzer: PairAnalyzer,
    builder: GridBuilder,
    selector: PairSelector,
    ledger: GridLedger,
    portfolio: Portfolio,
    risk: RiskController,
    enabled: Vec<Symbol>,
    eligible: Vec<Symbol>,
    pair_states: BTreeMap<Symbol, PairState>,
    counters: EngineCounters,
}

impl Engine {
    pub fn new(config: &Config, now: DateTime<Utc>) -> Self {
        Self::from_snapshot(config, Snapshot::default(), now)
    }

    /// Rebuild from a persisted snapshot; missing parts fall back to config defaults
    pub fn from_snapshot(config: &Config, snapshot: Snapshot, now: DateTime<Utc>) -> Self {
        let fees = FeeSchedule::new(config.exchange.maker_fee, config.exchange.taker_fee);
        let mut ledger = GridLedger::new(config.account.max_grids, fees);
        ledger.restore(snapshot.grids);

        let portfolio = snapshot
            .portfolio
            .unwrap_or_else(|| Portfolio::new(config.account.deposit, now));
        let enabled = snapshot
            .enabled_pairs
            .unwrap_or_else(|| config.scheduler.enabled_pairs());

        Self {
            analyzer: PairAnalyzer::new(config.analysis.clone()),
            builder: GridBuilder::new(config.account.clone(), fees),
            selector: PairSelector::new(config.selector.clone(), config.analysis.atr_period),
            ledger,
            portfolio,
            risk: RiskController::with_state(config.risk.clone(), snapshot.risk),
            eligible: enabled.clone(),
            enabled,
            pair_states: snapshot.pair_states,
            counters: snapshot.counters,
        }
    }

    /// Load the stored snapshot and rebuild from it. A snapshot the store
    /// cannot read is an error, so callers never save over it.
    pub fn restore(config: &Config, store: &dyn StateStore, now: DateTime<Utc>) -> Result<Self> {
        let snapshot = store
            .load()
            .with_context(|| format!("Failed to load state from {}", store.describe()))?;
        Ok(Self::from_snapshot(config, snapshot, now))
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Some(now),
            enabled_pairs: Some(self.enabled.clone()),
            grids: self.ledger.grids().cloned().collect(),
            portfolio: Some(self.portfolio.clone()),
            risk: self.risk.state().clone(),
            counters: self.counters,
            pair_states: self.pair_states.clone(),
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn ledger(&self) -> &GridLedger {
        &self.ledger
    }

    pub fn mode(&self) -> RiskMode {
        self.risk.mode()
    }

    pub fn enabled_pairs(&self) -> &[Symbol] {
        &self.enabled
    }

    /// Pairs eligible in the last cycle
    pub fn eligible_pairs(&self) -> &[Symbol] {
        &self.eligible
    }

    /// Enable or disable a pair. Takes effect at the next cycle.
    /// Returns whether anything changed.
    pub fn set_enabled(&mut self, pair: Symbol, enabled: bool) -> bool {
        let present = self.enabled.contains(&pair);
        match (enabled, present) {
            (true, false) => {
                info!(pair = %pair, "Pair enabled");
                self.enabled.push(pair);
                true
            }
            (false, true) => {
                info!(pair = %pair, "Pair disabled");
                self.enabled.retain(|p| p != &pair);
                true
            }
            _ => false,
        }
    }

    pub fn stats(&self) -> EngineStats {
        let mut pairs: Vec<Symbol> = self.enabled.clone();
        for p in self.eligible.iter().chain(self.pair_states.keys()) {
            if !pairs.contains(p) && (self.eligible.contains(p) || self.ledger.contains(p)) {
                pairs.push(p.clone());
            }
        }

        EngineStats {
            active_grids: self.ledger.len(),
            capacity: self.ledger.capacity(),
            counters: self.counters,
            equity: self.portfolio.equity(),
            total_pnl: self.portfolio.total_pnl,
            daily_pnl: self.portfolio.daily_pnl,
            weekly_pnl: self.portfolio.weekly_pnl,
            deal_count: self.portfolio.deal_count,
            max_drawdown: self.portfolio.max_drawdown,
            drawdown: self.portfolio.drawdown_pct(),
            mode: self.risk.mode(),
            pairs: pairs
                .into_iter()
                .map(|p| {
                    let state = self.pair_states.get(&p).cloned().unwrap_or_default();
                    (p, state)
                })
                .collect(),
        }
    }

    /// Last diagnostic for a pair
    pub fn reason(&self, pair: &Symbol) -> Option<&PairState> {
        self.pair_states.get(pair)
    }

    pub fn force_resume(&mut self) -> RiskEvent {
        self.risk.force_resume(&self.portfolio)
    }

    /// Pairs whose candles the next cycle needs
    pub fn candle_pairs(&self) -> Vec<Symbol> {
        let universe = if self.selector.is_auto() {
            self.selector.universe()
        } else {
            Vec::new()
        };
        eligible_pairs(&universe, &self.enabled)
    }

    /// Pairs whose latest price the next cycle needs
    pub fn price_pairs(&self) -> Vec<Symbol> {
        self.ledger.pairs()
    }

    fn set_state(&mut self, pair: &Symbol, status: PairStatus, reason: impl Into<String>) {
        self.pair_states.insert(
            pair.clone(),
            PairState {
                status,
                reason: reason.into(),
            },
        );
    }

    fn closed(&mut self, grid: Grid, reason: CloseReason) -> EngineEvent {
        self.counters.grids_closed += 1;
        EngineEvent::GridClosed {
            abandoned_open_orders: grid.open_orders(),
            realized_pnl: grid.realized_pnl,
            pair: grid.pair,
            reason,
        }
    }

    /// Apply one full scan cycle
    pub fn run_cycle(&mut self, market: &MarketData, now: DateTime<Utc>) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        let roll = self.portfolio.roll_calendar(now);
        events.extend(self.risk.on_calendar(roll).into_iter().map(EngineEvent::Risk));

        let auto = self.selector.select(&market.candles);
        self.eligible = eligible_pairs(&auto, &self.enabled);
        let eligible: HashSet<Symbol> = self.eligible.iter().cloned().collect();

        for grid in self.ledger.retain_eligible(&eligible) {
            self.set_state(&grid.pair.clone(), PairStatus::Wait, "pair disabled");
            events.push(self.closed(grid, CloseReason::Disabled));
        }

        events.extend(self.apply_prices(&market.prices));

        events.extend(
            self.risk
                .evaluate(&self.portfolio)
                .into_iter()
                .map(EngineEvent::Risk),
        );

        if !self.risk.allows_new_grids() {
            let mode = self.risk.mode();
            for grid in self.ledger.clear() {
                events.push(self.closed(grid, CloseReason::RiskHalt));
            }
            for pair in self.eligible.clone() {
                self.set_state(&pair, PairStatus::Paused, format!("risk mode {}", mode));
            }
            return events;
        }

        events.extend(self.scan(&market.candles, now));
        events
    }

    /// Drive active grids with the latest prices
    fn apply_prices(&mut self, prices: &HashMap<Symbol, f64>) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        for pair in self.ledger.pairs() {
            let Some(&price) = prices.get(&pair) else {
                debug!(pair = %pair, "No price this cycle, grid left untouched");
                continue;
            };

            match self.ledger.apply_tick(&pair, price, &mut self.portfolio) {
                TickOutcome::Filled(fills) => {
                    events.extend(fills.into_iter().map(EngineEvent::Filled));
                }
                TickOutcome::TornDown(grid) => {
                    self.set_state(&pair, PairStatus::Wait, format!("band exit at {:.4}", price));
                    events.push(self.closed(grid, CloseReason::OutOfBand));
                }
                TickOutcome::NoGrid => {}
            }
        }

        events
    }

    /// Analyze eligible pairs in order and open grids while capacity remains
    fn scan(
        &mut self,
        candles: &HashMap<Symbol, Vec<Candle>>,
        now: DateTime<Utc>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        for pair in self.eligible.clone() {
            if let Some(grid) = self.ledger.get(&pair) {
                let reason = format!(
                    "{} | orders {} | open {} | pnl {:+.4}",
                    grid.side,
                    grid.orders.len(),
                    grid.open_orders(),
                    grid.realized_pnl
                );
                self.set_state(&pair, PairStatus::Grid, reason);
                continue;
            }

            if !self.ledger.has_capacity() {
                let reason = format!(
                    "grid capacity reached ({}/{})",
                    self.ledger.len(),
                    self.ledger.capacity()
                );
                self.set_state(&pair, PairStatus::Wait, reason);
                continue;
            }

            let analysis = match candles
                .get(&pair)
                .ok_or(ScanError::DataUnavailable)
                .and_then(|c| self.analyzer.analyze(c))
            {
                Ok(a) => a,
                Err(e) => {
                    debug!(pair = %pair, "Skipped: {}", e);
                    self.set_state(&pair, PairStatus::Wait, e.to_string());
                    continue;
                }
            };

            let Some(side) = analysis.trend.side() else {
                self.set_state(
                    &pair,
                    PairStatus::Flat,
                    format!("EMA flat | ATR {:.2}%", analysis.atr_pct()),
                );
                continue;
            };

            let outcome = self.builder.build(&GridRequest {
                pair: pair.clone(),
                side,
                price: analysis.price,
                atr: analysis.atr(),
                atr_pct: analysis.atr_pct(),
                now,
            });
            self.counters.orders_total += outcome.candidates as u64;
            self.counters.orders_filtered += outcome.filtered as u64;

            let grid = match outcome.result {
                Ok(grid) => grid,
                Err(e) => {
                    self.counters.grids_rejected += 1;
                    self.set_state(&pair, PairStatus::Filtered, e.to_string());
                    continue;
                }
            };

            let opened = EngineEvent::GridOpened {
                pair: pair.clone(),
                side,
                price_low: grid.price_low,
                price_high: grid.price_high,
                orders: grid.orders.len(),
            };
            let orders = grid.orders.len();

            match self.ledger.insert(grid) {
                Ok(()) => {
                    self.counters.grids_started += 1;
                    self.set_state(
                        &pair,
                        PairStatus::Grid,
                        format!(
                            "{} | ATR {:.2}% | orders {}",
                            side,
                            analysis.atr_pct(),
                            orders
                        ),
                    );
                    events.push(opened);
                }
                Err(e) => self.set_state(&pair, PairStatus::Wait, e.to_string()),
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_set_enabled_is_idempotent() {
        let mut engine = Engine::new(&Config::default(), now());
        assert!(!engine.set_enabled(Symbol::new("BTCUSDT"), true));
        assert!(engine.set_enabled(Symbol::new("SOLUSDT"), true));
        assert!(engine.set_enabled(Symbol::new("BTCUSDT"), false));
        assert!(!engine.set_enabled(Symbol::new("BTCUSDT"), false));
        assert_eq!(
            engine.enabled_pairs(),
            &[Symbol::new("ETHUSDT"), Symbol::new("SOLUSDT")]
        );
    }

    #[test]
    fn test_missing_candles_recorded_as_reason() {
        let mut engine = Engine::new(&Config::default(), now());
        engine.run_cycle(&MarketData::default(), now());

        let state = engine.reason(&Symbol::new("BTCUSDT")).unwrap();
        assert_eq!(state.status, PairStatus::Wait);
        assert_eq!(state.reason, "market data unavailable");
    }

    #[test]
    fn test_stats_render_lists_pairs() {
        let mut engine = Engine::new(&Config::default(), now());
        engine.run_cycle(&MarketData::default(), now());
        let text = engine.stats().to_string();
        assert!(text.contains("Active grids: 0/2"));
        assert!(text.contains("• BTCUSDT: WAIT | market data unavailable"));
        assert!(text.contains("Mode: ACTIVE"));
    }

    #[test]
    fn test_snapshot_roundtrip_keeps_enabled_and_counters() {
        let mut engine = Engine::new(&Config::default(), now());
        engine.set_enabled(Symbol::new("SOLUSDT"), true);
        engine.run_cycle(&MarketData::default(), now());

        let snap = engine.snapshot(now());
        let restored = Engine::from_snapshot(&Config::default(), snap, now());
        assert_eq!(restored.enabled_pairs(), engine.enabled_pairs());
        assert_eq!(restored.stats(), engine.stats());
    }
}
