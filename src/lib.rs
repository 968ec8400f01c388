//! Grid Paper Trader
//!
//! A paper-trading grid engine for crypto pairs. Trending pairs get an
//! ATR-sized ladder of simulated limit orders; fills are booked against a
//! virtual portfolio guarded by daily/weekly ROI pauses and a drawdown
//! breaker. No real orders are ever placed.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use grid_paper_trader::{
//!     config::Config, engine::Engine, market_data::BinanceGateway,
//!     notify::LogNotifier, scheduler::Scheduler, state_store::SqliteStateStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let engine = Engine::new(&config, chrono::Utc::now());
//!     let gateway = Arc::new(BinanceGateway::new(&config.exchange)?);
//!     let store = Box::new(SqliteStateStore::open_in_memory()?);
//!     let mut scheduler = Scheduler::new(&config, engine, gateway, Box::new(LogNotifier), store);
//!     let events = scheduler.run_once(chrono::Utc::now()).await;
//!     println!("{} events", events.len());
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod indicators;
pub mod market_data;
pub mod notify;
pub mod portfolio;
pub mod risk;
pub mod scheduler;
pub mod selector;
pub mod state_store;
pub mod types;

pub use config::Config;
pub use engine::{Engine, EngineEvent, EngineStats, MarketData};
pub use error::{LedgerError, ScanError};
pub use types::*;
