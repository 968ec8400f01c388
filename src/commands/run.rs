//! Run the paper-trading grid bot
//!
//! - Async scan loop with graceful shutdown
//! - State restored from and saved to the configured store
//! - Operator commands read from stdin (`/stats`, `/why`, `/enable PAIR`, ...)

use anyhow::{Context, Result};
use chrono::Utc;
use grid_paper_trader::config::Config;
use grid_paper_trader::engine::Engine;
use grid_paper_trader::market_data::BinanceGateway;
use grid_paper_trader::notify::create_notifier;
use grid_paper_trader::scheduler::{ControlCommand, ControlRequest, Scheduler};
use grid_paper_trader::state_store::create_state_store;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

pub fn run(config_path: String) -> Result<()> {
    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run_async(config_path));
    // stdin reader may still be blocked on a read
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run_async(config_path: String) -> Result<()> {
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║            GRID PAPER TRADER - SIMULATED ORDERS ONLY         ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║ Deposit: {:<51.2} ║", config.account.deposit);
    info!("║ Leverage: {:<50} ║", config.account.leverage);
    info!("║ Max grids: {:<49} ║", config.account.max_grids);
    info!("║ Pairs: {:<53} ║", config.scheduler.enabled_pairs.join(", "));
    info!("║ Auto-select: {:<47} ║", config.selector.auto);
    info!("║ Interval: {:<50} ║", config.exchange.interval);
    info!("║ Scan every: {} seconds{:<38} ║", config.scheduler.scan_interval_secs, "");
    info!("╚══════════════════════════════════════════════════════════════╝");

    let store = create_state_store(&config.scheduler.state_dir, config.scheduler.state_backend)?;
    let engine = Engine::restore(&config, store.as_ref(), Utc::now())?;
    info!(
        "Restored {} active grids, mode {}",
        engine.ledger().len(),
        engine.mode()
    );

    let gateway = Arc::new(BinanceGateway::new(&config.exchange)?);
    let notifier = create_notifier(&config.notify);
    notifier.notify("🚀 Grid bot started (paper)").await;

    let mut scheduler = Scheduler::new(&config, engine, gateway, notifier, store);

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    let (control_tx, control_rx) = mpsc::channel::<ControlRequest>(8);
    tokio::spawn(read_commands(control_tx));

    scheduler.run(shutdown_rx, control_rx).await?;
    info!("Grid bot session ended.");
    Ok(())
}

async fn read_commands(control_tx: mpsc::Sender<ControlRequest>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = ControlCommand::parse(&line) else {
            warn!("Unknown command: {}", line.trim());
            continue;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if control_tx.send((command, reply_tx)).await.is_err() {
            break;
        }
        if let Ok(reply) = reply_rx.await {
            println!("{}", reply);
        }
    }
}
