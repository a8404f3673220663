//! Config commands.

use std::path::Path;

use clap::Subcommand;
use console::style;

use sio_core::config::AppConfig;
use sio_core::error::{SioError, SioResult};

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path.
    Path,
}

pub fn run(
    config: &AppConfig,
    path: &Path,
    action: ConfigAction,
    format: OutputFormat,
) -> SioResult<()> {
    match action {
        ConfigAction::Show => {
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(config)?);
                }
                OutputFormat::Text => {
                    let source = if path.exists() {
                        path.display().to_string()
                    } else {
                        "built-in defaults".to_string()
                    };
                    println!("{} {}", style("# source:").dim(), style(source).dim());
                    print!("{}", config.to_toml()?);
                }
            }
            Ok(())
        }
        ConfigAction::Init { force } => {
            init(path, force)?;
            println!(
                "  {} Wrote default config to {}",
                style("OK").green().bold(),
                path.display()
            );
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Write the default configuration to `path`.
fn init(path: &Path, force: bool) -> SioResult<()> {
    if path.exists() && !force {
        return Err(SioError::Config(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }
    AppConfig::default().save_to_file(path)
}
