//! Pair trend/volatility classification
//!
//! A pair trends LONG when `price > ema_fast > ema_slow` and SHORT when
//! `price < ema_fast < ema_slow`. Anything else is FLAT.

use crate::config::AnalysisConfig;
use crate::error::ScanError;
use crate::indicators::{atr, atr_pct, ema};
use crate::{Candle, IndicatorSnapshot, TrendSignal};

/// Result of analysing one candle window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairAnalysis {
    pub price: f64,
    pub trend: TrendSignal,
    pub indicators: IndicatorSnapshot,
}

impl PairAnalysis {
    pub fn atr(&self) -> f64 {
        self.indicators.atr
    }

    pub fn atr_pct(&self) -> f64 {
        self.indicators.atr_pct
    }
}

#[derive(Debug, Clone)]
pub struct PairAnalyzer {
    config: AnalysisConfig,
}

impl PairAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Classify the window. Fails with `InsufficientData` below the minimum
    /// window and `IndicatorUnavailable` when an indicator is undefined.
    pub fn analyze(&self, candles: &[Candle]) -> Result<PairAnalysis, ScanError> {
        if candles.len() < self.config.min_candles {
            return Err(ScanError::InsufficientData {
                got: candles.len(),
                need: self.config.min_candles,
            });
        }

        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();

        let price = *close.last().ok_or(ScanError::DataUnavailable)?;
        let ema_fast =
            ema(&close, self.config.ema_fast).ok_or(ScanError::IndicatorUnavailable("EMA"))?;
        let ema_slow =
            ema(&close, self.config.ema_slow).ok_or(ScanError::IndicatorUnavailable("EMA"))?;
        let atr = atr(&high, &low, &close, self.config.atr_period)
            .ok_or(ScanError::IndicatorUnavailable("ATR"))?;
        let atr_pct = atr_pct(atr, price).ok_or(ScanError::IndicatorUnavailable("ATR"))?;

        let trend = if price > ema_fast && ema_fast > ema_slow {
            TrendSignal::Long
        } else if price < ema_fast && ema_fast < ema_slow {
            TrendSignal::Short
        } else {
            TrendSignal::Flat
        };

        Ok(PairAnalysis {
            price,
            trend,
            indicators: IndicatorSnapshot {
                ema_fast,
                ema_slow,
                atr,
                atr_pct,
            },
        })
    }
}
