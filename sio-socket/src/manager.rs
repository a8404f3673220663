//! Socket.IO client facade.
//!
//! [`SocketManager`] is the public entry point: it owns the shared session,
//! starts and stops connection sequences, turns `emit` calls into queued
//! EVENT frames, and exposes the event delivery queue.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use sio_core::config::{AppConfig, SocketConfig};
use sio_core::constants;
use sio_core::error::SioResult;

use crate::connector;
use crate::events::{event_channel, ConnectionState, EventPump, LifecycleEvent, SocketEvent};
use crate::packet::{event_payload, EventData, Packet};
use crate::session::Shared;
use crate::transport::build_target_url;

/// Reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Reconnect when the heartbeat detects a dead session.
    pub enabled: bool,
    /// Failed dials after which the connector gives up.
    pub max_attempts: u32,
    /// Delay after a failed dial: `retry_base + attempt * retry_step`.
    pub retry_base: Duration,
    pub retry_step: Duration,
    /// Delay before redialing after a heartbeat failure:
    /// `recovery_base + attempt * recovery_step` plus jitter of up to
    /// `(attempt + 1) * recovery_jitter`.
    pub recovery_base: Duration,
    pub recovery_step: Duration,
    pub recovery_jitter: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: constants::MAX_RECONNECT_ATTEMPTS,
            retry_base: Duration::from_millis(constants::RETRY_BASE_MS),
            retry_step: Duration::from_millis(constants::RETRY_STEP_MS),
            recovery_base: Duration::from_millis(constants::RECOVERY_BASE_MS),
            recovery_step: Duration::from_millis(constants::RECOVERY_STEP_MS),
            recovery_jitter: Duration::from_millis(constants::RECOVERY_JITTER_MS),
        }
    }
}

impl ReconnectConfig {
    /// Backoff after the failed dial number `attempt` (zero-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base + self.retry_step.saturating_mul(attempt)
    }

    /// Backoff before redialing after a heartbeat failure.
    pub fn recovery_delay(&self, attempt: u32) -> Duration {
        let jitter_cap = self.recovery_jitter.saturating_mul(attempt.saturating_add(1));
        let jitter_ms = jitter_cap.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.recovery_base + self.recovery_step.saturating_mul(attempt) + jitter
    }
}

/// Heartbeat timing.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Base period between pings.
    pub interval: Duration,
    /// Maximum random jitter added to each period.
    pub jitter: Duration,
    /// Deadline for the pong after a ping is queued.
    pub ping_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(constants::HEARTBEAT_INTERVAL_MS),
            jitter: Duration::from_millis(constants::HEARTBEAT_JITTER_MS),
            ping_timeout: Duration::from_millis(constants::PING_TIMEOUT_MS),
        }
    }
}

impl HeartbeatConfig {
    /// The next ping period, interval plus jitter.
    pub fn next_period(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Everything that tunes a client, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    /// Extra query string for the handshake URL.
    pub query: String,
    /// Outbound frames older than this are dropped unsent.
    pub stale_after: Duration,
    pub connect_timeout: Duration,
    /// Bound on how long `close()` waits for its frames and the server.
    pub close_flush_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            query: String::new(),
            stale_after: Duration::from_millis(constants::STALE_OUTBOUND_MS),
            connect_timeout: Duration::from_millis(constants::CONNECT_TIMEOUT_MS),
            close_flush_timeout: Duration::from_millis(constants::CLOSE_FLUSH_TIMEOUT_MS),
            max_message_size: constants::MAX_MESSAGE_SIZE,
        }
    }
}

impl From<&SocketConfig> for ClientOptions {
    fn from(socket: &SocketConfig) -> Self {
        Self {
            reconnect: ReconnectConfig {
                enabled: socket.auto_reconnect,
                max_attempts: socket.max_reconnect_attempts,
                retry_base: Duration::from_millis(socket.retry_base_ms),
                retry_step: Duration::from_millis(socket.retry_step_ms),
                recovery_base: Duration::from_millis(socket.recovery_base_ms),
                recovery_step: Duration::from_millis(socket.recovery_step_ms),
                recovery_jitter: Duration::from_millis(socket.recovery_jitter_ms),
            },
            heartbeat: HeartbeatConfig {
                interval: Duration::from_millis(socket.heartbeat_interval_ms),
                jitter: Duration::from_millis(socket.heartbeat_jitter_ms),
                ping_timeout: Duration::from_millis(socket.ping_timeout_ms),
            },
            query: String::new(),
            stale_after: Duration::from_millis(socket.stale_after_ms),
            connect_timeout: Duration::from_millis(socket.connect_timeout_ms),
            close_flush_timeout: Duration::from_millis(socket.close_flush_timeout_ms),
            max_message_size: socket.max_message_size,
        }
    }
}

impl From<&AppConfig> for ClientOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            query: config.server.query.clone(),
            ..Self::from(&config.socket)
        }
    }
}

/// Socket.IO client over a single WebSocket.
///
/// Manages the full lifecycle of the connection:
/// - Dialing with linear backoff up to an attempt ceiling
/// - OPEN handshake and session id tracking
/// - Heartbeat pings with reconnect on a missed pong
/// - Ordered outbound emits, dropping frames that went stale while offline
/// - Event delivery through a queue the caller pumps
///
/// Dropping the manager stops every background task.
pub struct SocketManager {
    shared: Arc<Shared>,
    events: EventPump,
}

impl SocketManager {
    /// Create a client for `address` (`http`, `https`, `ws` or `wss`).
    ///
    /// Nothing is dialed until [`connect`](Self::connect).
    pub fn new(name: impl Into<String>, address: &str, options: ClientOptions) -> SioResult<Self> {
        let name = name.into();
        let address = AppConfig::sanitize_server_address(address);
        let target = build_target_url(&address, &options.query)?;
        let (dispatcher, events) = event_channel();
        debug!("[{name}] socket target {target}");

        Ok(Self {
            shared: Arc::new(Shared::new(name, target, options, dispatcher)),
            events,
        })
    }

    /// Create a client from the application configuration.
    pub fn from_config(config: &AppConfig) -> SioResult<Self> {
        Self::new(
            config.server.name.clone(),
            &config.server.address,
            ClientOptions::from(config),
        )
    }

    /// Instance name used in log lines.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The WebSocket handshake URL.
    pub fn target_url(&self) -> &Url {
        &self.shared.target
    }

    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.state().await
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_receiver()
    }

    /// Session id of the current session; `None` once it closes or is lost.
    pub async fn socket_id(&self) -> Option<String> {
        self.shared.socket_id().await
    }

    pub async fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts().await
    }

    /// Start a connection sequence in the background.
    ///
    /// Does nothing while connected or already connecting. Progress is
    /// reported through the lifecycle events (`connecting`, `open`,
    /// `connect`, `connect_error`, ...).
    pub async fn connect(&self) {
        if !self.shared.begin_connect().await {
            debug!("[{}] already connected or connecting, skipping", self.name());
            return;
        }
        let run = self.shared.renew_run_token();
        info!("[{}] socket connecting to {}", self.name(), self.shared.target);
        connector::spawn(self.shared.clone(), run);
    }

    /// Gracefully end the session and stop reconnecting.
    ///
    /// With a live transport this sends DISCONNECT then CLOSE and waits (up
    /// to the close flush timeout) for them to be written and for the
    /// server to close the socket.
    pub async fn close(&self) {
        let shared = &self.shared;
        let transport = shared.live_transport().await;
        shared.set_state(ConnectionState::Disconnected).await;
        shared.clear_socket_id().await;
        shared.stop_heartbeat().await;

        if let Some(transport) = transport {
            let flush = shared.options.close_flush_timeout;
            shared.send_packet(&Packet::disconnect());
            let receipt = shared.outbound.enqueue_with_receipt(Packet::close().encode());
            if tokio::time::timeout(flush, receipt).await.is_err() {
                warn!("[{}] close frame not flushed within {flush:?}", self.name());
            }
            if tokio::time::timeout(flush, transport.closed()).await.is_err() {
                debug!("[{}] server kept the transport open, closing it", self.name());
                transport.abort();
                shared.emit(LifecycleEvent::Close, None);
            }
        }

        shared.cancel_run();
        shared.retire_generation().await;
        info!("[{}] socket closed", self.name());
    }

    /// Emit an event without data: `42["name"]`.
    pub fn emit(&self, event: &str) {
        self.enqueue_event(event, EventData::None);
    }

    /// Emit an event, embedding `data` as JSON if it is a JSON object or
    /// array and as a string otherwise.
    pub fn emit_data(&self, event: &str, data: &str) {
        self.enqueue_event(event, EventData::detect(data));
    }

    /// Emit an event with explicit data handling.
    ///
    /// With `is_plain_text` the data is sent as a JSON string; otherwise it
    /// must be valid JSON and is embedded as-is.
    pub fn emit_raw(&self, event: &str, data: &str, is_plain_text: bool) -> SioResult<()> {
        let data = if is_plain_text {
            EventData::PlainText(data)
        } else {
            EventData::Json(data)
        };
        let payload = event_payload(event, data)?;
        self.shared.send_packet(&Packet::event(payload));
        Ok(())
    }

    /// Emit an event with serialized data.
    pub fn emit_json<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> SioResult<()> {
        let json = serde_json::to_string(data)?;
        self.emit_raw(event, &json, false)
    }

    fn enqueue_event(&self, event: &str, data: EventData<'_>) {
        match event_payload(event, data) {
            Ok(payload) => self.shared.send_packet(&Packet::event(payload)),
            // Detected JSON always re-parses, so this is unreachable in practice.
            Err(err) => warn!("[{}] dropped emit of {event}: {err}", self.name()),
        }
    }

    /// Register a handler for a server event or lifecycle event name.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.events.on(event, handler);
    }

    /// Remove all handlers for `event`.
    pub fn off(&self, event: &str) {
        self.events.off(event);
    }

    /// Deliver every queued event to its handlers on the calling thread.
    /// Returns how many events were delivered.
    pub fn pump_events(&self) -> usize {
        self.events.pump()
    }

    /// Wait for the next event, run its handlers, and return it.
    pub async fn next_event(&self) -> Option<SocketEvent> {
        self.events.next().await
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        self.shared.cancel_run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn manager() -> SocketManager {
        SocketManager::new("test", "http://localhost:1234", ClientOptions::default()).unwrap()
    }

    async fn next_frame(manager: &SocketManager) -> String {
        manager
            .shared
            .outbound
            .dequeue(&CancellationToken::new())
            .await
            .unwrap()
            .frame()
            .to_string()
    }

    #[tokio::test]
    async fn test_initial_state() {
        let manager = manager();
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert_eq!(manager.socket_id().await, None);
        assert_eq!(manager.reconnect_attempts().await, 0);
        assert_eq!(
            manager.target_url().as_str(),
            "ws://localhost:1234/socket.io/?EIO=3&transport=websocket"
        );
    }

    #[tokio::test]
    async fn test_emit_frames() {
        let manager = manager();
        manager.emit("KnockKnock");
        manager.emit_data("foo", "bar");
        manager.emit_data("ThisIsData", r#"{"name":"neo"}"#);
        manager.emit_raw("list", "[1,2]", false).unwrap();
        manager.emit_raw("quoted", "{not json", true).unwrap();

        assert_eq!(next_frame(&manager).await, r#"42["KnockKnock"]"#);
        assert_eq!(next_frame(&manager).await, r#"42["foo","bar"]"#);
        assert_eq!(next_frame(&manager).await, r#"42["ThisIsData",{"name":"neo"}]"#);
        assert_eq!(next_frame(&manager).await, r#"42["list",[1,2]]"#);
        assert_eq!(next_frame(&manager).await, r#"42["quoted","{not json"]"#);
    }

    #[tokio::test]
    async fn test_emit_raw_rejects_invalid_json() {
        let manager = manager();
        assert!(manager.emit_raw("bad", "{not json", false).is_err());
        assert!(manager.shared.outbound.try_dequeue().is_none());
    }

    #[tokio::test]
    async fn test_emit_json() {
        #[derive(Serialize)]
        struct Greeting<'a> {
            name: &'a str,
            count: u32,
        }

        let manager = manager();
        manager
            .emit_json("greet", &Greeting { name: "neo", count: 2 })
            .unwrap();
        assert_eq!(
            next_frame(&manager).await,
            r#"42["greet",{"name":"neo","count":2}]"#
        );
    }

    #[test]
    fn test_invalid_address() {
        let result = SocketManager::new("test", "ftp://example.com", ClientOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let config = ReconnectConfig::default();
        assert_eq!(config.retry_delay(0), Duration::from_millis(500));
        assert_eq!(config.retry_delay(1), Duration::from_millis(1_500));
        assert_eq!(config.retry_delay(3), Duration::from_millis(3_500));
    }

    #[test]
    fn test_recovery_delay_bounds() {
        let config = ReconnectConfig::default();
        for attempt in [0u32, 1, 4] {
            let delay = config.recovery_delay(attempt);
            let floor = Duration::from_millis(300 + 1_500 * attempt as u64);
            let ceiling = floor + Duration::from_millis(200 * (attempt as u64 + 1));
            assert!(delay >= floor && delay <= ceiling, "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_heartbeat_period_bounds() {
        let config = HeartbeatConfig::default();
        for _ in 0..20 {
            let period = config.next_period();
            assert!(period >= Duration::from_millis(2_500));
            assert!(period <= Duration::from_millis(3_000));
        }
    }

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.server.query = "token=abc".into();
        config.socket.auto_reconnect = false;
        config.socket.ping_timeout_ms = 750;

        let options = ClientOptions::from(&config);
        assert_eq!(options.query, "token=abc");
        assert!(!options.reconnect.enabled);
        assert_eq!(options.heartbeat.ping_timeout, Duration::from_millis(750));
        assert_eq!(options.stale_after, Duration::from_secs(10));

        let manager = SocketManager::from_config(&config).unwrap();
        assert_eq!(manager.name(), "default");
        assert_eq!(
            manager.target_url().query(),
            Some("EIO=3&transport=websocket&token=abc")
        );
    }

    #[tokio::test]
    async fn test_close_without_session() {
        let manager = manager();
        manager.close().await;
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert_eq!(manager.pump_events(), 0);
    }
}
