//! Protocol and client-wide constants.

/// Application name, used for platform directories and log files.
pub const APP_NAME: &str = "sio-client";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine.IO protocol revision spoken by the client.
pub const ENGINE_IO_VERSION: u8 = 3;

/// Handshake path on the server.
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Fixed handshake query selecting the protocol revision and transport.
pub const HANDSHAKE_QUERY: &str = "EIO=3&transport=websocket";

/// The default (and only supported) namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Default server address when nothing is configured.
pub const DEFAULT_SERVER_ADDRESS: &str = "http://127.0.0.1:8888";

/// Outbound entries older than this are dropped instead of sent.
pub const STALE_OUTBOUND_MS: u64 = 10_000;

/// Automatic reconnection stops after this many failed attempts.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 150;

/// Connect-failure backoff: `RETRY_BASE_MS + attempt * RETRY_STEP_MS`.
pub const RETRY_BASE_MS: u64 = 500;
pub const RETRY_STEP_MS: u64 = 1_000;

/// Heartbeat-failure backoff: `RECOVERY_BASE_MS + attempt * RECOVERY_STEP_MS`
/// plus up to `attempt * RECOVERY_JITTER_MS` of jitter.
pub const RECOVERY_BASE_MS: u64 = 300;
pub const RECOVERY_STEP_MS: u64 = 1_500;
pub const RECOVERY_JITTER_MS: u64 = 200;

/// Heartbeat period and the random jitter added to it.
pub const HEARTBEAT_INTERVAL_MS: u64 = 2_500;
pub const HEARTBEAT_JITTER_MS: u64 = 500;

/// Deadline for a PONG after a PING was queued.
pub const PING_TIMEOUT_MS: u64 = 2_000;

/// Deadline for the WebSocket handshake.
pub const CONNECT_TIMEOUT_MS: u64 = 20_000;

/// How long a graceful close waits for the CLOSE frame to be flushed.
pub const CLOSE_FLUSH_TIMEOUT_MS: u64 = 1_000;

/// Largest reassembled WebSocket message accepted from the server.
pub const MAX_MESSAGE_SIZE: usize = 16 << 20;

/// Disconnect reasons carried by the `disconnect` lifecycle event.
pub mod reasons {
    pub const PING_TIMEOUT: &str = "ping timeout";
    pub const TRANSPORT_CLOSE: &str = "transport close";
    pub const TRANSPORT_ERROR: &str = "transport error";
    pub const SERVER_DISCONNECT: &str = "io server disconnect";
}
