//! sioctl - command-line Socket.IO client.
//!
//! Connects to an Engine.IO v3 / Socket.IO v2 server, prints every event it
//! receives and emits events on request. Useful for poking at a server from
//! the terminal and for scripting.

mod commands;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sio_core::config::AppConfig;
use sio_core::error::SioResult;
use sio_core::logging;

/// sioctl - talk to a Socket.IO server from the terminal.
#[derive(Parser)]
#[command(
    name = "sioctl",
    version,
    about = "Socket.IO v2 client CLI",
    long_about = "A command-line client for Engine.IO v3 / Socket.IO v2 servers.\n\
                  Connects over WebSocket, prints incoming events and emits events on request."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a server and print events until Ctrl+C.
    Connect(commands::connect::ConnectArgs),
    /// Show or create the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> SioResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = commands::config_path(cli.config.as_deref())?;
    let config = AppConfig::load_or_default(&config_path)?;

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("logs"));
    let _guard = match logging::init_logging(log_level, &log_dir, config.logging.json_output) {
        Ok(guard) => Some(guard),
        Err(err) => {
            logging::init_console_logging(log_level);
            warn!("file logging unavailable ({}): {err}", log_dir.display());
            None
        }
    };

    info!("sioctl v{}", sio_core::constants::APP_VERSION);

    // Dispatch to command handlers
    match cli.command {
        Commands::Connect(args) => {
            commands::connect::run(config, &config_path, args, cli.format).await
        }
        Commands::Config { action } => {
            commands::config::run(&config, &config_path, action, cli.format)
        }
    }
}
