//! Connect command - hold a session open and print its events.

use std::path::Path;

use clap::Args;
use console::style;
use dialoguer::Input;
use tracing::error;

use sio_core::config::AppConfig;
use sio_core::error::{SioError, SioResult};
use sio_socket::{LifecycleEvent, SocketEvent, SocketManager};

use crate::OutputFormat;

#[derive(Args, Debug, Default)]
pub struct ConnectArgs {
    /// Server address (overrides config).
    #[arg(short, long)]
    pub address: Option<String>,
    /// Extra handshake query, e.g. "token=abc" (overrides config).
    #[arg(short, long)]
    pub query: Option<String>,
    /// Instance name used in log lines (overrides config).
    #[arg(short, long)]
    pub name: Option<String>,
    /// Event to emit after every connect, as EVENT or EVENT=DATA. Repeatable.
    #[arg(short, long = "emit", value_name = "EVENT[=DATA]")]
    pub emits: Vec<String>,
    /// Do not reconnect when the heartbeat fails.
    #[arg(long)]
    pub no_reconnect: bool,
    /// Save the connection settings to the config file.
    #[arg(long)]
    pub save: bool,
}

/// An event to emit, parsed from `EVENT[=DATA]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitSpec {
    pub event: String,
    pub data: Option<String>,
}

impl EmitSpec {
    pub fn parse(spec: &str) -> SioResult<Self> {
        let (event, data) = match spec.split_once('=') {
            Some((event, data)) => (event, Some(data.to_string())),
            None => (spec, None),
        };
        let event = event.trim();
        if event.is_empty() {
            return Err(SioError::Config(format!("invalid --emit '{spec}': empty event name")));
        }
        Ok(Self {
            event: event.to_string(),
            data,
        })
    }
}

/// Run the connect command.
pub async fn run(
    mut config: AppConfig,
    config_path: &Path,
    args: ConnectArgs,
    format: OutputFormat,
) -> SioResult<()> {
    let emits = args
        .emits
        .iter()
        .map(|spec| EmitSpec::parse(spec))
        .collect::<SioResult<Vec<_>>>()?;

    // Determine address: arg > config > interactive prompt
    let address = match args.address {
        Some(address) => address,
        None if config.server.address.trim().is_empty() => Input::<String>::new()
            .with_prompt("Server address")
            .interact_text()
            .map_err(|e| SioError::Internal(e.to_string()))?,
        None => config.server.address.clone(),
    };
    config.server.address = AppConfig::sanitize_server_address(&address);
    if config.server.address.is_empty() {
        error!("no server address configured. Use --address or set it in config.");
        return Err(SioError::MissingConfig("server address".into()));
    }
    if let Some(query) = args.query {
        config.server.query = query;
    }
    if let Some(name) = args.name {
        config.server.name = name;
    }
    if args.no_reconnect {
        config.socket.auto_reconnect = false;
    }

    if args.save {
        config.save_to_file(config_path)?;
        println!(
            "  {} Config saved to {}",
            style("OK").green(),
            config_path.display()
        );
    }

    let manager = SocketManager::from_config(&config)?;
    if format == OutputFormat::Text {
        println!(
            "{} Connecting to {}... (Ctrl+C to stop)",
            style("[sioctl]").bold().dim(),
            manager.target_url()
        );
    }
    manager.connect().await;

    loop {
        tokio::select! {
            event = manager.next_event() => {
                let Some(event) = event else { break };
                print_event(&event, format)?;

                match event.as_lifecycle() {
                    Some(LifecycleEvent::Connect) => {
                        for spec in &emits {
                            match &spec.data {
                                Some(data) => manager.emit_data(&spec.event, data),
                                None => manager.emit(&spec.event),
                            }
                        }
                    }
                    Some(LifecycleEvent::ReconnectFailed) => {
                        return Err(SioError::ReconnectExhausted {
                            attempts: manager.options().reconnect.max_attempts,
                        });
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if format == OutputFormat::Text {
                    println!("\n  Disconnecting...");
                }
                manager.close().await;
                // Show whatever the close produced.
                while let Ok(Some(event)) = tokio::time::timeout(
                    std::time::Duration::from_millis(50),
                    manager.next_event(),
                ).await {
                    print_event(&event, format)?;
                }
                break;
            }
        }
    }

    Ok(())
}

fn print_event(event: &SocketEvent, format: OutputFormat) -> SioResult<()> {
    match format {
        OutputFormat::Json => {
            let line = serde_json::json!({
                "time": chrono::Local::now().to_rfc3339(),
                "event": event.name,
                "data": event.data,
                "lifecycle": event.as_lifecycle().is_some(),
            });
            println!("{}", serde_json::to_string(&line)?);
        }
        OutputFormat::Text => {
            let name = format!("[{}]", event.name);
            let name = match event.as_lifecycle() {
                Some(LifecycleEvent::Open | LifecycleEvent::Connect) => style(name).green().bold(),
                Some(
                    LifecycleEvent::Disconnect
                    | LifecycleEvent::ConnectError
                    | LifecycleEvent::ReconnectError
                    | LifecycleEvent::ReconnectFailed
                    | LifecycleEvent::Error,
                ) => style(name).red().bold(),
                Some(_) => style(name).yellow(),
                None => style(name).cyan(),
            };
            println!(
                "  {} {} {}",
                style(super::timestamp()).dim(),
                name,
                event.data().unwrap_or("")
            );
        }
    }
    Ok(())
}
