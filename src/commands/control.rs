//! Offline control commands
//!
//! Operate on the persisted snapshot: load it, apply one command, save it
//! back when the command changes state. A running bot picks the change up
//! only after a restart, so prefer stdin commands while it is running.

use anyhow::{Context, Result};
use chrono::Utc;
use grid_paper_trader::config::Config;
use grid_paper_trader::engine::Engine;
use grid_paper_trader::scheduler::{apply_command, ControlCommand};
use grid_paper_trader::state_store::create_state_store;
use tracing::info;

pub fn run(config_path: String, command: ControlCommand) -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    let store = create_state_store(&config.scheduler.state_dir, config.scheduler.state_backend)?;
    let now = Utc::now();
    let mut engine = Engine::restore(&config, store.as_ref(), now)?;
    let mutates = matches!(
        command,
        ControlCommand::Enable(_) | ControlCommand::Disable(_) | ControlCommand::Resume
    );

    let reply = apply_command(&mut engine, command);
    if mutates {
        store.save(&engine.snapshot(now))?;
        info!("State written to {}", store.describe());
    }

    println!("{}", reply);
    Ok(())
}
