//! Socket events, the delivery queue, and connection state.
//!
//! Every callback a client can observe goes through one FIFO: the
//! background loops push into it via [`EventDispatcher`], and the consumer
//! drains it with [`EventPump::pump`] (run handlers synchronously) or
//! [`EventPump::next`] (await one event). Handlers therefore never run on the
//! I/O tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

/// Lifecycle events raised by the client itself.
///
/// User events from the server share the same queue and are told apart by
/// name only, so these names are effectively reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// First dial attempt is starting (`connecting`).
    Connecting,
    /// A retry dial is starting; data is the attempt number (`reconnecting`).
    Reconnecting,
    /// The server's OPEN handshake arrived (`open`).
    Open,
    /// The session is usable (`connect`).
    Connect,
    /// The first dial failed; data is the error (`connect_error`).
    ConnectError,
    /// A retry dial failed; data is the error (`reconnect_error`).
    ReconnectError,
    /// Automatic reconnection gave up (`reconnect_failed`).
    ReconnectFailed,
    /// An established session was lost; data is the reason (`disconnect`).
    Disconnect,
    /// The session ended after a requested close (`close`).
    Close,
    /// A send failed or the server reported an error (`error`).
    Error,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 10] = [
        Self::Connecting,
        Self::Reconnecting,
        Self::Open,
        Self::Connect,
        Self::ConnectError,
        Self::ReconnectError,
        Self::ReconnectFailed,
        Self::Disconnect,
        Self::Close,
        Self::Error,
    ];

    /// Parse a reserved event name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }

    /// The event name handlers register under.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Reconnecting => "reconnecting",
            Self::Open => "open",
            Self::Connect => "connect",
            Self::ConnectError => "connect_error",
            Self::ReconnectError => "reconnect_error",
            Self::ReconnectFailed => "reconnect_failed",
            Self::Disconnect => "disconnect",
            Self::Close => "close",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued event with its optional payload text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    /// Event name: a server event name or a [`LifecycleEvent`] name.
    pub name: String,
    /// Payload text. Server string payloads arrive unquoted, other JSON
    /// values as JSON text.
    pub data: Option<String>,
}

impl SocketEvent {
    pub fn new(name: impl Into<String>, data: Option<String>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn lifecycle(event: LifecycleEvent, data: Option<String>) -> Self {
        Self::new(event.as_str(), data)
    }

    /// The lifecycle event this is, if the name is reserved.
    pub fn as_lifecycle(&self) -> Option<LifecycleEvent> {
        LifecycleEvent::from_name(&self.name)
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }
}

/// A registered event callback.
pub type EventHandler = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Producer side of the delivery queue. Cheap to clone.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: mpsc::UnboundedSender<SocketEvent>,
}

impl EventDispatcher {
    /// Queue an event for the consumer.
    pub fn dispatch(&self, event: SocketEvent) {
        let name = event.name.clone();
        match self.sender.send(event) {
            Ok(()) => trace!("queued event {name}"),
            // The pump is gone: the client is being torn down.
            Err(_) => debug!("no consumer for event {name}"),
        }
    }
}

/// Consumer side of the delivery queue plus the handler registry.
pub struct EventPump {
    receiver: Mutex<mpsc::UnboundedReceiver<SocketEvent>>,
    handlers: StdMutex<HashMap<String, Vec<EventHandler>>>,
}

/// Create a connected dispatcher/pump pair.
pub fn event_channel() -> (EventDispatcher, EventPump) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        EventDispatcher { sender },
        EventPump {
            receiver: Mutex::new(receiver),
            handlers: StdMutex::new(HashMap::new()),
        },
    )
}

impl EventPump {
    /// Register a handler for `name`. Handlers for the same name run in
    /// registration order.
    pub fn on<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.lock_handlers()
            .entry(name.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Remove every handler registered for `name`.
    pub fn off(&self, name: &str) {
        self.lock_handlers().remove(name);
    }

    /// Drain all queued events, running their handlers on the calling
    /// thread. Returns how many events were drained.
    ///
    /// Returns 0 without blocking if another caller is already draining.
    pub fn pump(&self) -> usize {
        let Ok(mut receiver) = self.receiver.try_lock() else {
            return 0;
        };
        let mut drained = 0;
        while let Ok(event) = receiver.try_recv() {
            self.deliver(&event);
            drained += 1;
        }
        drained
    }

    /// Wait for the next event, run its handlers, and return it.
    pub async fn next(&self) -> Option<SocketEvent> {
        let event = self.receiver.lock().await.recv().await?;
        self.deliver(&event);
        Some(event)
    }

    fn deliver(&self, event: &SocketEvent) {
        // Clone out of the lock so handlers may register more handlers.
        let handlers: Vec<EventHandler> = self
            .lock_handlers()
            .get(&event.name)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(event.data());
        }
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<String, Vec<EventHandler>>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Connection state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// First dial in progress.
    Connecting,
    /// OPEN handshake received; the session is usable.
    Connected,
    /// Retrying after a lost session or failed dial.
    Reconnecting,
    /// The last dial or the transport failed.
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Error => write!(f, "error"),
        }
    }
}
