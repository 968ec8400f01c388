//! Core data types used across the grid engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick data, oldest first when held in a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trading pair symbol (e.g. "BTCUSDT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction a grid trades in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Trend classification of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendSignal {
    Long,
    Short,
    Flat,
}

impl TrendSignal {
    /// Grid side for a directional signal, `None` when flat
    pub fn side(self) -> Option<Side> {
        match self {
            TrendSignal::Long => Some(Side::Long),
            TrendSignal::Short => Some(Side::Short),
            TrendSignal::Flat => None,
        }
    }
}

/// Indicator values derived from a candle window. Recomputed every cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub atr: f64,
    pub atr_pct: f64,
}

/// Where a pair stands after the latest scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PairStatus {
    /// Waiting for data or indicators
    #[default]
    Wait,
    /// No trend, no grid attempted
    Flat,
    /// Grid active
    Grid,
    /// Grid candidate rejected by the profitability screen
    Filtered,
    /// Risk controller blocks new grids
    Paused,
}

impl std::fmt::Display for PairStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PairStatus::Wait => "WAIT",
            PairStatus::Flat => "FLAT",
            PairStatus::Grid => "GRID",
            PairStatus::Filtered => "FILTERED",
            PairStatus::Paused => "PAUSED",
        };
        write!(f, "{}", s)
    }
}
