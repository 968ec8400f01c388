//! Automatic pair selection
//!
//! Ranks the configured universe by how close each pair's ATR% sits to the
//! target volatility. Stateless: recomputed from scratch every cycle.

use std::collections::HashMap;

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::config::SelectorConfig;
use crate::indicators::{atr, atr_pct};
use crate::{Candle, Symbol};

/// Volatility fitness of one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pair: Symbol,
    pub price: f64,
    pub atr_pct: f64,
}

#[derive(Debug, Clone)]
pub struct PairSelector {
    config: SelectorConfig,
    atr_period: usize,
}

impl PairSelector {
    pub fn new(config: SelectorConfig, atr_period: usize) -> Self {
        Self { config, atr_period }
    }

    pub fn is_auto(&self) -> bool {
        self.config.auto
    }

    pub fn universe(&self) -> Vec<Symbol> {
        self.config.universe()
    }

    fn measure(&self, pair: &Symbol, candles: &[Candle]) -> Option<Candidate> {
        let price = candles.last()?.close;
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let atr = atr(&high, &low, &close, self.atr_period)?;

        Some(Candidate {
            pair: pair.clone(),
            price,
            atr_pct: atr_pct(atr, price)?,
        })
    }

    /// Top-K pairs of the universe by distance to the target ATR%.
    /// Pairs without data are skipped; ties keep universe order.
    pub fn select(&self, market: &HashMap<Symbol, Vec<Candle>>) -> Vec<Symbol> {
        if !self.config.auto {
            return Vec::new();
        }

        let target = self.config.target_atr_pct;
        let ranked: Vec<Symbol> = self
            .universe()
            .iter()
            .filter_map(|pair| self.measure(pair, market.get(pair)?))
            .filter(|c| c.price <= self.config.max_price)
            .filter(|c| c.atr_pct >= self.config.min_atr_pct && c.atr_pct <= self.config.max_atr_pct)
            .sorted_by_key(|c| OrderedFloat((c.atr_pct - target).abs()))
            .take(self.config.top_k)
            .map(|c| c.pair)
            .collect();

        tracing::debug!("Auto-selected pairs: {:?}", ranked);
        ranked
    }
}

/// Eligible pairs for a cycle: auto-selected pairs first, then manually
/// enabled ones, without duplicates.
pub fn eligible_pairs(auto: &[Symbol], enabled: &[Symbol]) -> Vec<Symbol> {
    auto.iter().chain(enabled.iter()).unique().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Flat candles with a constant high-low range of `range`
    fn window(price: f64, range: f64) -> Vec<Candle> {
        (0..30)
            .map(|_| Candle {
                datetime: Utc::now(),
                open: price,
                high: price + range / 2.0,
                low: price - range / 2.0,
                close: price,
                volume: 1.0,
            })
            .collect()
    }

    fn config() -> SelectorConfig {
        SelectorConfig {
            auto: true,
            universe: vec!["AAAUSDT".into(), "BBBUSDT".into(), "CCCUSDT".into(), "DDDUSDT".into()],
            max_price: 1_000.0,
            min_atr_pct: 0.2,
            max_atr_pct: 1.5,
            target_atr_pct: 0.6,
            top_k: 2,
        }
    }

    #[test]
    fn test_ranks_by_distance_to_target() {
        let selector = PairSelector::new(config(), 14);
        let mut market = HashMap::new();
        market.insert(Symbol::new("AAAUSDT"), window(100.0, 1.0)); // 1.0%
        market.insert(Symbol::new("BBBUSDT"), window(100.0, 0.6)); // 0.6%
        market.insert(Symbol::new("CCCUSDT"), window(100.0, 0.3)); // 0.3%
        market.insert(Symbol::new("DDDUSDT"), window(100.0, 3.0)); // out of band

        assert_eq!(
            selector.select(&market),
            vec![Symbol::new("BBBUSDT"), Symbol::new("CCCUSDT")]
        );
    }

    #[test]
    fn test_price_ceiling_excludes() {
        let selector = PairSelector::new(config(), 14);
        let mut market = HashMap::new();
        market.insert(Symbol::new("AAAUSDT"), window(5_000.0, 30.0)); // 0.6% but too pricey
        market.insert(Symbol::new("BBBUSDT"), window(100.0, 1.0));

        assert_eq!(selector.select(&market), vec![Symbol::new("BBBUSDT")]);
    }

    #[test]
    fn test_manual_mode_selects_nothing() {
        let selector = PairSelector::new(SelectorConfig::default(), 14);
        let mut market = HashMap::new();
        market.insert(Symbol::new("BTCUSDT"), window(100.0, 0.6));
        assert!(selector.select(&market).is_empty());
    }

    #[test]
    fn test_eligible_union_without_duplicates() {
        let auto = vec![Symbol::new("SOLUSDT"), Symbol::new("BTCUSDT")];
        let enabled = vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")];
        assert_eq!(
            eligible_pairs(&auto, &enabled),
            vec![Symbol::new("SOLUSDT"), Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")]
        );
    }
}
