//! Grid paper trader - main entry point
//!
//! Subcommands:
//! - run: Start the scan loop
//! - status / why: Inspect the saved state
//! - enable / disable: Change the enabled pair set
//! - resume: Force the risk controller back to ACTIVE

use anyhow::Result;
use clap::{Parser, Subcommand};
use grid_paper_trader::scheduler::ControlCommand;
use grid_paper_trader::Symbol;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-paper-trader")]
#[command(about = "Paper-trading grid bot with ATR-sized grids and risk controls", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "configs/default.json")]
    config: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the grid bot
    Run,

    /// Show the control panel from saved state
    Status,

    /// Show why pairs have no grid
    Why {
        /// Only this pair
        pair: Option<String>,
    },

    /// Enable a pair
    Enable {
        /// Trading pair, e.g. BTCUSDT
        pair: String,
    },

    /// Disable a pair; its grid is torn down at the next cycle
    Disable {
        /// Trading pair, e.g. BTCUSDT
        pair: String,
    },

    /// Force the risk controller back to ACTIVE
    Resume,
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn,teloxide=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if file_only {
        // Inspection commands print to stdout; keep the console clean
        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Run => "run",
        Commands::Status => "status",
        Commands::Why { .. } => "why",
        Commands::Enable { .. } => "enable",
        Commands::Disable { .. } => "disable",
        Commands::Resume => "resume",
    };
    setup_logging(cli.verbose, command_name, !matches!(cli.command, Commands::Run))?;

    let control = match cli.command {
        Commands::Run => return commands::run::run(cli.config),
        Commands::Status => ControlCommand::Stats,
        Commands::Why { pair } => ControlCommand::Why(pair.map(Symbol::new)),
        Commands::Enable { pair } => ControlCommand::Enable(Symbol::new(pair)),
        Commands::Disable { pair } => ControlCommand::Disable(Symbol::new(pair)),
        Commands::Resume => ControlCommand::Resume,
    };

    commands::control::run(cli.config, control)
}
