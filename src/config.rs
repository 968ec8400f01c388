//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for notification credentials. Every section has a
//! default, so a partial file (or `{}`) is a valid config.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub account: AccountConfig,
    pub analysis: AnalysisConfig,
    pub risk: RiskConfig,
    pub selector: SelectorConfig,
    pub scheduler: SchedulerConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::from_file(path);
        }

        tracing::warn!(
            "Config file {} not found, using defaults",
            path.as_ref().display()
        );
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Pick up notification credentials from the environment
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.notify.telegram_token = Some(token);
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            match chat_id.parse::<i64>() {
                Ok(id) => self.notify.telegram_chat_id = Some(id),
                Err(_) => tracing::warn!("TELEGRAM_CHAT_ID is not a number, ignoring"),
            }
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let a = &self.account;
        if a.deposit <= 0.0 {
            bail!("account.deposit must be positive, got {}", a.deposit);
        }
        if a.leverage <= 0.0 {
            bail!("account.leverage must be positive, got {}", a.leverage);
        }
        if !(a.margin_per_grid > 0.0 && a.margin_per_grid <= 1.0) {
            bail!(
                "account.margin_per_grid must be in (0, 1], got {}",
                a.margin_per_grid
            );
        }
        if a.max_grids == 0 {
            bail!("account.max_grids must be at least 1");
        }
        match &a.level_policy {
            LevelPolicy::Fixed { levels, multiplier } => {
                if *levels == 0 || *multiplier <= 0.0 {
                    bail!("fixed level policy needs levels >= 1 and a positive multiplier");
                }
            }
            LevelPolicy::Tiered { tiers, fallback } => {
                if tiers.iter().chain(std::iter::once(fallback)).any(|t| t.levels == 0) {
                    bail!("volatility tiers need at least one level each");
                }
            }
        }

        let an = &self.analysis;
        if an.ema_fast == 0 || an.ema_slow == 0 || an.atr_period == 0 {
            bail!("analysis periods must be non-zero");
        }

        let r = &self.risk;
        if r.drawdown_resume_pct <= r.drawdown_stop_pct {
            bail!(
                "risk.drawdown_resume_pct ({}) must be less strict than drawdown_stop_pct ({})",
                r.drawdown_resume_pct,
                r.drawdown_stop_pct
            );
        }
        if r.daily_stop_loss >= r.daily_take_profit || r.weekly_stop_loss >= r.weekly_take_profit {
            bail!("risk stop-loss bounds must lie below take-profit bounds");
        }

        let s = &self.selector;
        if s.auto && (s.top_k == 0 || s.min_atr_pct > s.max_atr_pct) {
            bail!("selector needs top_k >= 1 and min_atr_pct <= max_atr_pct");
        }

        if self.scheduler.scan_interval_secs == 0 {
            bail!("scheduler.scan_interval_secs must be non-zero");
        }

        Ok(())
    }
}

/// Exchange and market-data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub maker_fee: f64,
    pub taker_fee: f64,
    /// Candle interval requested from the exchange
    pub interval: String,
    pub candle_limit: u32,
    pub request_timeout_secs: u64,
    /// Consecutive failures before the fetch breaker opens
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            maker_fee: 0.0002, // 0.02%
            taker_fee: 0.0004, // 0.04%
            interval: "5m".to_string(),
            candle_limit: 120,
            request_timeout_secs: 10,
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 60,
        }
    }
}

/// One row of the volatility tier table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityTier {
    /// Tier applies when `atr_pct < below_atr_pct`
    #[serde(default = "f64_max")]
    pub below_atr_pct: f64,
    pub levels: usize,
    pub multiplier: f64,
}

fn f64_max() -> f64 {
    f64::MAX
}

/// How many levels a grid gets and how wide its band is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LevelPolicy {
    Fixed {
        levels: usize,
        multiplier: f64,
    },
    Tiered {
        #[serde(default = "default_tiers")]
        tiers: Vec<VolatilityTier>,
        #[serde(default = "default_fallback_tier")]
        fallback: VolatilityTier,
    },
}

fn default_tiers() -> Vec<VolatilityTier> {
    vec![
        VolatilityTier {
            below_atr_pct: 0.4,
            levels: 10,
            multiplier: 3.5,
        },
        VolatilityTier {
            below_atr_pct: 0.8,
            levels: 8,
            multiplier: 2.5,
        },
    ]
}

fn default_fallback_tier() -> VolatilityTier {
    VolatilityTier {
        below_atr_pct: f64::MAX,
        levels: 6,
        multiplier: 1.8,
    }
}

impl Default for LevelPolicy {
    fn default() -> Self {
        LevelPolicy::Tiered {
            tiers: default_tiers(),
            fallback: default_fallback_tier(),
        }
    }
}

impl LevelPolicy {
    /// `(levels, atr multiplier)` for a pair with the given ATR%
    pub fn resolve(&self, atr_pct: f64) -> (usize, f64) {
        match self {
            LevelPolicy::Fixed { levels, multiplier } => (*levels, *multiplier),
            LevelPolicy::Tiered { tiers, fallback } => {
                let tier = tiers
                    .iter()
                    .find(|t| atr_pct < t.below_atr_pct)
                    .unwrap_or(fallback);
                (tier.levels, tier.multiplier)
            }
        }
    }
}

/// Paper account and grid sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Reference capital, never changes
    pub deposit: f64,
    pub leverage: f64,
    /// Fraction of the deposit committed as margin per grid
    pub margin_per_grid: f64,
    /// Capacity of the grid ledger
    pub max_grids: usize,
    pub min_order_notional: f64,
    pub min_expected_pnl: f64,
    /// Scales the minimum expected PnL with volatility; 0 disables
    pub atr_pnl_factor: f64,
    pub level_policy: LevelPolicy,
}

impl Default for AccountConfig {
    fn default() -> Self {
        AccountConfig {
            deposit: 100.0,
            leverage: 10.0,
            margin_per_grid: 0.10,
            max_grids: 2,
            min_order_notional: 5.0,
            min_expected_pnl: 0.02,
            atr_pnl_factor: 0.01,
            level_policy: LevelPolicy::default(),
        }
    }
}

/// Trend/volatility analysis windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_candles: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub atr_period: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            min_candles: 50,
            ema_fast: 7,
            ema_slow: 25,
            atr_period: 14,
        }
    }
}

/// Portfolio risk limits. ROI bounds are fractions of the deposit,
/// drawdown thresholds are percentages (negative).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub daily_stop_loss: f64,
    pub daily_take_profit: f64,
    pub weekly_stop_loss: f64,
    pub weekly_take_profit: f64,
    pub drawdown_stop_pct: f64,
    pub drawdown_resume_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            daily_stop_loss: -0.05,
            daily_take_profit: 0.10,
            weekly_stop_loss: -0.10,
            weekly_take_profit: 0.25,
            drawdown_stop_pct: -20.0,
            drawdown_resume_pct: -10.0,
        }
    }
}

/// Automatic pair selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub auto: bool,
    pub universe: Vec<String>,
    /// Pairs priced above this are skipped
    pub max_price: f64,
    pub min_atr_pct: f64,
    pub max_atr_pct: f64,
    pub target_atr_pct: f64,
    pub top_k: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        SelectorConfig {
            auto: false,
            universe: [
                "BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "DOGEUSDT", "AVAXUSDT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_price: 100_000.0,
            min_atr_pct: 0.2,
            max_atr_pct: 1.5,
            target_atr_pct: 0.6,
            top_k: 2,
        }
    }
}

impl SelectorConfig {
    pub fn universe(&self) -> Vec<Symbol> {
        self.universe.iter().map(Symbol::new).collect()
    }
}

/// Which state store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Json,
    Sqlite,
}

/// Scan loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pairs enabled on first start; the persisted set wins afterwards
    pub enabled_pairs: Vec<String>,
    pub scan_interval_secs: u64,
    /// 0 disables heartbeats
    pub heartbeat_interval_secs: u64,
    pub state_backend: StateBackend,
    pub state_dir: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            enabled_pairs: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            scan_interval_secs: 20,
            heartbeat_interval_secs: 3600,
            state_backend: StateBackend::Json,
            state_dir: PathBuf::from("state"),
        }
    }
}

impl SchedulerConfig {
    pub fn enabled_pairs(&self) -> Vec<Symbol> {
        self.enabled_pairs.iter().map(Symbol::new).collect()
    }
}

/// Notification sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.account.deposit, 100.0);
        assert_eq!(config.account.max_grids, 2);
        assert_eq!(config.analysis.ema_slow, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tiered_policy_boundaries() {
        let policy = LevelPolicy::default();
        assert_eq!(policy.resolve(0.1), (10, 3.5));
        assert_eq!(policy.resolve(0.4), (8, 2.5));
        assert_eq!(policy.resolve(0.79), (8, 2.5));
        assert_eq!(policy.resolve(0.8), (6, 1.8));
        assert_eq!(policy.resolve(5.0), (6, 1.8));
    }

    #[test]
    fn test_fixed_policy_from_json() {
        let json = r#"{ "account": { "level_policy": { "mode": "fixed", "levels": 8, "multiplier": 2.5 } } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.account.level_policy.resolve(3.0), (8, 2.5));
        // untouched fields keep their defaults
        assert_eq!(config.account.leverage, 10.0);
    }

    #[test]
    fn test_validate_rejects_inverted_hysteresis() {
        let mut config = Config::default();
        config.risk.drawdown_resume_pct = -25.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_deposit() {
        let mut config = Config::default();
        config.account.deposit = 0.0;
        assert!(config.validate().is_err());
    }
}
