//! CLI command implementations.

pub mod config;
pub mod connect;

use std::path::PathBuf;

use sio_core::config::AppConfig;
use sio_core::error::SioResult;

/// Resolve the configuration file path: `--config` if given, otherwise the
/// platform default.
pub fn config_path(cli_path: Option<&str>) -> SioResult<PathBuf> {
    match cli_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => AppConfig::default_config_path(),
    }
}

/// Current local time for event lines.
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}
