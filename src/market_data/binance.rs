//! Binance public market data (spot REST API)
//!
//! No API key required. Requests go through a [`FetchBreaker`] so a failing
//! exchange costs one timeout per cooldown instead of one per pair.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use super::breaker::FetchBreaker;
use super::MarketDataGateway;
use crate::config::ExchangeConfig;
use crate::{Candle, Symbol};

/// Base URL for Binance API
const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";

/// Maximum klines per request (Binance limit)
const MAX_KLINES_PER_REQUEST: u32 = 1000;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Parse one raw kline row: `[open_time, open, high, low, close, volume, ...]`
fn parse_kline(raw: &[serde_json::Value]) -> Option<Candle> {
    if raw.len() < 6 {
        return None;
    }

    Some(Candle {
        datetime: DateTime::from_timestamp_millis(raw[0].as_i64()?)?,
        open: raw[1].as_str()?.parse().ok()?,
        high: raw[2].as_str()?.parse().ok()?,
        low: raw[3].as_str()?.parse().ok()?,
        close: raw[4].as_str()?.parse().ok()?,
        volume: raw[5].as_str()?.parse().ok()?,
    })
}

pub struct BinanceGateway {
    client: Client,
    base_url: String,
    breaker: Mutex<FetchBreaker>,
}

impl BinanceGateway {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        Self::with_base_url(config, BINANCE_API_BASE)
    }

    pub fn with_base_url(config: &ExchangeConfig, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            breaker: Mutex::new(FetchBreaker::new(
                config.breaker_failure_threshold,
                Duration::from_secs(config.breaker_cooldown_secs),
            )),
        })
    }

    fn can_attempt(&self) -> bool {
        self.breaker.lock().map(|mut b| b.can_attempt()).unwrap_or(true)
    }

    fn record<T>(&self, result: &Result<T>) {
        if let Ok(mut b) = self.breaker.lock() {
            match result {
                Ok(_) => b.record_success(),
                Err(_) => b.record_failure(),
            }
        }
    }

    async fn fetch_klines(&self, pair: &Symbol, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!("{}/klines", self.base_url);
        let limit = limit.min(MAX_KLINES_PER_REQUEST);
        let params = [
            ("symbol", pair.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];

        debug!(
            "Fetching klines: symbol={}, interval={}, limit={}",
            pair, interval, limit
        );

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to send request to Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw_data: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Binance response")?;

        Ok(raw_data.iter().filter_map(|r| parse_kline(r)).collect())
    }

    async fn fetch_price(&self, pair: &Symbol) -> Result<f64> {
        let url = format!("{}/ticker/price", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", pair.as_str())])
            .send()
            .await
            .context("Failed to send request to Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let ticker: TickerPrice = response
            .json()
            .await
            .context("Failed to parse ticker response")?;

        ticker
            .price
            .parse()
            .with_context(|| format!("Invalid price '{}'", ticker.price))
    }
}

#[async_trait]
impl MarketDataGateway for BinanceGateway {
    async fn get_candles(&self, pair: &Symbol, interval: &str, limit: u32) -> Vec<Candle> {
        if !self.can_attempt() {
            debug!(pair = %pair, "Breaker open, skipping klines");
            return Vec::new();
        }

        let result = self.fetch_klines(pair, interval, limit).await;
        self.record(&result);
        result.unwrap_or_else(|e| {
            warn!(pair = %pair, "Kline fetch failed: {:#}", e);
            Vec::new()
        })
    }

    async fn get_latest_price(&self, pair: &Symbol) -> Option<f64> {
        if !self.can_attempt() {
            debug!(pair = %pair, "Breaker open, skipping price");
            return None;
        }

        let result = self.fetch_price(pair).await;
        self.record(&result);
        result
            .map_err(|e| warn!(pair = %pair, "Price fetch failed: {:#}", e))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_kline_row() {
        let raw = json!([
            1_700_000_000_000i64,
            "100.5",
            "101.0",
            "99.5",
            "100.8",
            "12.3",
            1_700_000_299_999i64,
            "1240.0",
            42,
            "6.0",
            "600.0",
            "0"
        ]);
        let row = raw.as_array().unwrap();
        let candle = parse_kline(row).unwrap();

        assert_eq!(candle.datetime.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(candle.open, 100.5);
        assert_eq!(candle.high, 101.0);
        assert_eq!(candle.low, 99.5);
        assert_eq!(candle.close, 100.8);
        assert_eq!(candle.volume, 12.3);
    }

    #[test]
    fn test_parse_kline_rejects_garbage() {
        let raw = json!([1_700_000_000_000i64, "abc", "1", "1", "1", "1"]);
        assert!(parse_kline(raw.as_array().unwrap()).is_none());
        assert!(parse_kline(&[]).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_exchange_fails_soft() {
        let config = ExchangeConfig {
            request_timeout_secs: 1,
            breaker_failure_threshold: 1,
            ..Default::default()
        };
        let gateway = BinanceGateway::with_base_url(&config, "http://127.0.0.1:9").unwrap();
        let pair = Symbol::new("BTCUSDT");

        assert!(gateway.get_candles(&pair, "5m", 10).await.is_empty());
        // breaker is open now, request is skipped
        assert!(gateway.get_latest_price(&pair).await.is_none());
    }
}
