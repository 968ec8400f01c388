//! Recoverable engine conditions
//!
//! None of these stop the process. A `ScanError` becomes the pair's reason
//! string and the pair is retried on the next cycle.

use thiserror::Error;

use crate::Symbol;

/// Why a pair produced no grid this cycle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    #[error("market data unavailable")]
    DataUnavailable,

    #[error("not enough candles ({got}/{need})")]
    InsufficientData { got: usize, need: usize },

    #[error("{0} unavailable")]
    IndicatorUnavailable(&'static str),

    #[error("orders filtered ({survivors}) | ATR {atr_pct:.2}%")]
    GridRejected { survivors: usize, atr_pct: f64 },
}

/// Grid registration failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{0} already has an active grid")]
    DuplicateGrid(Symbol),

    #[error("grid capacity reached ({0})")]
    CapacityReached(usize),
}
