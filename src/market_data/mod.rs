//! Market data access
//!
//! The engine consumes candles and last prices through [`MarketDataGateway`].
//! Implementations fail soft: errors are logged and surface as empty results.

pub mod binance;
pub mod breaker;

pub use binance::BinanceGateway;
pub use breaker::{BreakerState, FetchBreaker};

use async_trait::async_trait;

use crate::{Candle, Symbol};

#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Most recent `limit` candles, oldest first. Empty on failure.
    async fn get_candles(&self, pair: &Symbol, interval: &str, limit: u32) -> Vec<Candle>;

    /// Last traded price, `None` on failure
    async fn get_latest_price(&self, pair: &Symbol) -> Option<f64>;
}
