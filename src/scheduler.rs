//! Scan loop
//!
//! Each cycle fetches candles and prices for every pair concurrently, waits
//! for all of them, then hands the batch to the engine in one call. Engine
//! state is only touched from this task, so operator commands are queued
//! and applied between cycles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::{Engine, EngineEvent, MarketData};
use crate::market_data::MarketDataGateway;
use crate::notify::{event_message, NotificationSink};
use crate::state_store::StateStore;
use crate::{Candle, Symbol};

/// Operator command delivered to a running scheduler
#[derive(Debug)]
pub enum ControlCommand {
    Stats,
    /// Reasons for one pair, or for all of them
    Why(Option<Symbol>),
    Enable(Symbol),
    Disable(Symbol),
    Resume,
}

impl ControlCommand {
    /// Parse `/stats`, `/why [PAIR]`, `/enable PAIR`, `/disable PAIR`, `/resume`.
    /// The leading slash is optional.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().trim_start_matches('/').split_whitespace();
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next();
        if parts.next().is_some() {
            return None;
        }

        match (cmd.as_str(), arg) {
            ("stats" | "status", None) => Some(Self::Stats),
            ("why", pair) => Some(Self::Why(pair.map(Symbol::new))),
            ("enable", Some(p)) => Some(Self::Enable(Symbol::new(p))),
            ("disable", Some(p)) => Some(Self::Disable(Symbol::new(p))),
            ("resume", None) => Some(Self::Resume),
            _ => None,
        }
    }
}

/// A command plus the channel its reply goes to
pub type ControlRequest = (ControlCommand, oneshot::Sender<String>);

/// Apply a command to the engine and render the reply
pub fn apply_command(engine: &mut Engine, command: ControlCommand) -> String {
    match command {
        ControlCommand::Stats => engine.stats().to_string(),
        ControlCommand::Why(None) => why_report(engine),
        ControlCommand::Why(Some(pair)) => match engine.reason(&pair) {
            Some(state) => format!("{}: {} | {}", pair, state.status, state.reason),
            None => format!("{}: no data", pair),
        },
        ControlCommand::Enable(pair) => {
            if engine.set_enabled(pair.clone(), true) {
                format!("✅ {} enabled", pair)
            } else {
                format!("{} already enabled", pair)
            }
        }
        ControlCommand::Disable(pair) => {
            if engine.set_enabled(pair.clone(), false) {
                format!("⛔ {} disabled", pair)
            } else {
                format!("{} was not enabled", pair)
            }
        }
        ControlCommand::Resume => engine.force_resume().to_string(),
    }
}

/// Last diagnostic for every enabled or eligible pair
pub fn why_report(engine: &Engine) -> String {
    let mut lines = vec!["🤔 WHY NO GRID".to_string(), String::new()];
    for (pair, state) in engine.stats().pairs {
        let reason = if state.reason.is_empty() {
            "no data"
        } else {
            state.reason.as_str()
        };
        lines.push(format!("{}: {}", pair, reason));
    }
    lines.join("\n")
}

enum Fetched {
    Candles(Symbol, Vec<Candle>),
    Price(Symbol, Option<f64>),
}

pub struct Scheduler {
    engine: Engine,
    gateway: Arc<dyn MarketDataGateway>,
    notifier: Box<dyn NotificationSink>,
    store: Box<dyn StateStore>,
    candle_interval: String,
    candle_limit: u32,
    scan_interval: Duration,
    heartbeat_interval: Option<Duration>,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        engine: Engine,
        gateway: Arc<dyn MarketDataGateway>,
        notifier: Box<dyn NotificationSink>,
        store: Box<dyn StateStore>,
    ) -> Self {
        let heartbeat = config.scheduler.heartbeat_interval_secs;
        Self {
            engine,
            gateway,
            notifier,
            store,
            candle_interval: config.exchange.interval.clone(),
            candle_limit: config.exchange.candle_limit,
            scan_interval: Duration::from_secs(config.scheduler.scan_interval_secs.max(1)),
            heartbeat_interval: (heartbeat > 0).then(|| Duration::from_secs(heartbeat)),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Fetch everything the next cycle needs; returns once all requests finished
    pub async fn fetch(&self) -> MarketData {
        let mut tasks = JoinSet::new();

        for pair in self.engine.candle_pairs() {
            let gateway = Arc::clone(&self.gateway);
            let interval = self.candle_interval.clone();
            let limit = self.candle_limit;
            tasks.spawn(async move {
                let candles = gateway.get_candles(&pair, &interval, limit).await;
                Fetched::Candles(pair, candles)
            });
        }

        for pair in self.engine.price_pairs() {
            let gateway = Arc::clone(&self.gateway);
            tasks.spawn(async move {
                let price = gateway.get_latest_price(&pair).await;
                Fetched::Price(pair, price)
            });
        }

        let mut candles = HashMap::new();
        let mut prices = HashMap::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Fetched::Candles(pair, c)) if !c.is_empty() => {
                    candles.insert(pair, c);
                }
                Ok(Fetched::Candles(pair, _)) => debug!(pair = %pair, "No candles"),
                Ok(Fetched::Price(pair, Some(p))) => {
                    prices.insert(pair, p);
                }
                Ok(Fetched::Price(pair, None)) => debug!(pair = %pair, "No price"),
                Err(e) => error!("Fetch task failed: {}", e),
            }
        }

        MarketData { candles, prices }
    }

    /// One full cycle: fetch, apply, notify, persist
    pub async fn run_once(&mut self, now: DateTime<Utc>) -> Vec<EngineEvent> {
        let market = self.fetch().await;
        let events = self.engine.run_cycle(&market, now);

        for event in &events {
            if event.is_notable() {
                info!("{}", event);
                self.notifier.notify(&event_message(event)).await;
            } else {
                info!("Fill {}", event);
            }
        }

        self.persist(now);
        events
    }

    fn persist(&self, now: DateTime<Utc>) {
        if let Err(e) = self.store.save(&self.engine.snapshot(now)) {
            error!("Failed to save state to {}: {:#}", self.store.describe(), e);
        }
    }

    pub async fn heartbeat(&self) {
        let text = format!("💓 Heartbeat\n\n{}", self.engine.stats());
        self.notifier.notify(&text).await;
    }

    /// Run until a shutdown signal arrives
    pub async fn run(
        &mut self,
        mut shutdown_rx: mpsc::Receiver<()>,
        mut control_rx: mpsc::Receiver<ControlRequest>,
    ) -> Result<()> {
        let mut cycle_interval = interval(self.scan_interval);
        cycle_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let heartbeat_period = self.heartbeat_interval.unwrap_or(Duration::from_secs(3600));
        let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
        let heartbeat_enabled = self.heartbeat_interval.is_some();
        let mut control_open = true;
        let mut shutdown_open = true;

        info!("Starting scan loop...");

        loop {
            tokio::select! {
                _ = cycle_interval.tick() => {
                    let events = self.run_once(Utc::now()).await;
                    debug!("Cycle done, {} events", events.len());
                }
                _ = heartbeat.tick(), if heartbeat_enabled => {
                    self.heartbeat().await;
                }
                request = control_rx.recv(), if control_open => {
                    match request {
                        Some((command, reply)) => {
                            let text = apply_command(&mut self.engine, command);
                            self.persist(Utc::now());
                            if reply.send(text).is_err() {
                                warn!("Command reply dropped");
                            }
                        }
                        None => control_open = false,
                    }
                }
                signal = shutdown_rx.recv(), if shutdown_open => {
                    match signal {
                        Some(()) => {
                            info!("Shutdown signal received");
                            break;
                        }
                        None => {
                            warn!("Shutdown channel closed, stop with a restart");
                            shutdown_open = false;
                        }
                    }
                }
            }
        }

        self.persist(Utc::now());
        self.notifier.notify("🛑 Grid bot stopped").await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert!(matches!(ControlCommand::parse("/stats"), Some(ControlCommand::Stats)));
        assert!(matches!(ControlCommand::parse("why"), Some(ControlCommand::Why(None))));
        assert!(matches!(
            ControlCommand::parse("/why ethusdt"),
            Some(ControlCommand::Why(Some(p))) if p.as_str() == "ETHUSDT"
        ));
        assert!(matches!(
            ControlCommand::parse("/enable solusdt"),
            Some(ControlCommand::Enable(p)) if p.as_str() == "SOLUSDT"
        ));
        assert!(matches!(ControlCommand::parse("/resume"), Some(ControlCommand::Resume)));
        assert!(ControlCommand::parse("/enable").is_none());
        assert!(ControlCommand::parse("/stats extra").is_none());
        assert!(ControlCommand::parse("").is_none());
    }

    #[test]
    fn test_apply_enable_disable() {
        let mut engine = Engine::new(&Config::default(), Utc::now());
        let reply = apply_command(&mut engine, ControlCommand::Enable(Symbol::new("SOLUSDT")));
        assert_eq!(reply, "✅ SOLUSDT enabled");
        let reply = apply_command(&mut engine, ControlCommand::Disable(Symbol::new("XRPUSDT")));
        assert_eq!(reply, "XRPUSDT was not enabled");
    }

    #[test]
    fn test_why_report_lists_enabled_pairs() {
        let engine = Engine::new(&Config::default(), Utc::now());
        let text = why_report(&engine);
        assert!(text.starts_with("🤔 WHY NO GRID"));
        assert!(text.contains("BTCUSDT: no data"));
        assert!(text.contains("ETHUSDT: no data"));
    }
}
