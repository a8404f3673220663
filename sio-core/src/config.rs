//! Application configuration management.
//!
//! Handles loading, saving, and accessing the client configuration: which
//! server to talk to, how the socket times its heartbeats and retries, and
//! where logs go. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{SioError, SioResult};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Socket timing and reconnection settings.
    #[serde(default)]
    pub socket: SocketConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server URL (e.g., "http://127.0.0.1:8888").
    #[serde(default = "default_address")]
    pub address: String,

    /// Extra query string appended to the handshake URL.
    #[serde(default)]
    pub query: String,

    /// Instance name used to tag log lines.
    #[serde(default = "default_instance_name")]
    pub name: String,
}

/// Socket timing configuration. All durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Reconnect automatically when the heartbeat fails.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Failed attempts after which automatic reconnection gives up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base delay after a failed dial.
    #[serde(default = "default_retry_base")]
    pub retry_base_ms: u64,

    /// Additional delay per previous failed dial.
    #[serde(default = "default_retry_step")]
    pub retry_step_ms: u64,

    /// Base delay before reconnecting after a heartbeat failure.
    #[serde(default = "default_recovery_base")]
    pub recovery_base_ms: u64,

    /// Additional delay per attempt after a heartbeat failure.
    #[serde(default = "default_recovery_step")]
    pub recovery_step_ms: u64,

    /// Maximum jitter per attempt after a heartbeat failure.
    #[serde(default = "default_recovery_jitter")]
    pub recovery_jitter_ms: u64,

    /// Period between heartbeat pings.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Maximum random jitter added to each heartbeat period.
    #[serde(default = "default_heartbeat_jitter")]
    pub heartbeat_jitter_ms: u64,

    /// Deadline for the server's pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,

    /// Outbound packets older than this are dropped unsent.
    #[serde(default = "default_stale_after")]
    pub stale_after_ms: u64,

    /// Deadline for the WebSocket handshake.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// How long a graceful close waits for its frames to be flushed.
    #[serde(default = "default_close_flush_timeout")]
    pub close_flush_timeout_ms: u64,

    /// Largest reassembled message accepted from the server, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_address() -> String {
    constants::DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_instance_name() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    constants::MAX_RECONNECT_ATTEMPTS
}

fn default_retry_base() -> u64 {
    constants::RETRY_BASE_MS
}

fn default_retry_step() -> u64 {
    constants::RETRY_STEP_MS
}

fn default_recovery_base() -> u64 {
    constants::RECOVERY_BASE_MS
}

fn default_recovery_step() -> u64 {
    constants::RECOVERY_STEP_MS
}

fn default_recovery_jitter() -> u64 {
    constants::RECOVERY_JITTER_MS
}

fn default_heartbeat_interval() -> u64 {
    constants::HEARTBEAT_INTERVAL_MS
}

fn default_heartbeat_jitter() -> u64 {
    constants::HEARTBEAT_JITTER_MS
}

fn default_ping_timeout() -> u64 {
    constants::PING_TIMEOUT_MS
}

fn default_stale_after() -> u64 {
    constants::STALE_OUTBOUND_MS
}

fn default_connect_timeout() -> u64 {
    constants::CONNECT_TIMEOUT_MS
}

fn default_close_flush_timeout() -> u64 {
    constants::CLOSE_FLUSH_TIMEOUT_MS
}

fn default_max_message_size() -> usize {
    constants::MAX_MESSAGE_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            query: String::new(),
            name: default_instance_name(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            retry_base_ms: default_retry_base(),
            retry_step_ms: default_retry_step(),
            recovery_base_ms: default_recovery_base(),
            recovery_step_ms: default_recovery_step(),
            recovery_jitter_ms: default_recovery_jitter(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_jitter_ms: default_heartbeat_jitter(),
            ping_timeout_ms: default_ping_timeout(),
            stale_after_ms: default_stale_after(),
            connect_timeout_ms: default_connect_timeout(),
            close_flush_timeout_ms: default_close_flush_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist yet.
    pub fn load_or_default(path: &Path) -> SioResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> SioResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> SioResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = self.to_toml()?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Render the configuration as pretty TOML.
    pub fn to_toml(&self) -> SioResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SioError::Config(format!("failed to serialize config: {e}")))
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> SioResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| SioError::Config("could not determine config directory".into()))?;
        Ok(base.join(constants::APP_NAME).join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> SioResult<PathBuf> {
        if self.logging.directory.is_empty() {
            let base = dirs::data_dir()
                .ok_or_else(|| SioError::Config("could not determine data directory".into()))?;
            Ok(base.join(constants::APP_NAME).join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Sanitize and normalize a server address.
    ///
    /// Strips quotes, whitespace and trailing slashes, and adds `http://`
    /// when the address carries no scheme. `ws://` and `wss://` are kept.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let has_scheme = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| trimmed.starts_with(scheme));
        let with_scheme = if has_scheme {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}
