//! State shared between the facade and the background loops.
//!
//! A client goes through a series of connection *generations*. Each
//! generation owns one transport and one reader, writer and watchdog task,
//! all stopped through the generation's cancellation token. The client-wide
//! run token is the parent of every generation token, so cancelling it stops
//! everything including a pending dial or backoff.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::events::{ConnectionState, EventDispatcher, LifecycleEvent, SocketEvent};
use crate::manager::ClientOptions;
use crate::packet::Packet;
use crate::queue::OutboundQueue;
use crate::transport::TransportHandle;

/// How long a retiring generation's tasks get to wind down before they are
/// aborted.
const RETIRE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct SessionState {
    connection: ConnectionState,
    sid: Option<String>,
    attempts: u32,
}

/// One live connection and its loops.
pub(crate) struct Generation {
    pub id: u64,
    pub cancel: CancellationToken,
    pub heartbeat: CancellationToken,
    pub transport: TransportHandle,
    pub tasks: Vec<JoinHandle<()>>,
}

pub(crate) struct Shared {
    pub name: String,
    pub target: Url,
    pub options: ClientOptions,
    pub outbound: OutboundQueue,
    /// Serializes dial sequences.
    pub dial_lock: Mutex<()>,
    dispatcher: EventDispatcher,
    state: Mutex<SessionState>,
    state_tx: watch::Sender<ConnectionState>,
    awaiting_pong: watch::Sender<bool>,
    generation: Mutex<Option<Generation>>,
    run: StdMutex<CancellationToken>,
    generation_seq: AtomicU64,
}

impl Shared {
    pub fn new(
        name: String,
        target: Url,
        options: ClientOptions,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (awaiting_pong, _) = watch::channel(false);
        Self {
            name,
            target,
            options,
            outbound: OutboundQueue::new(),
            dial_lock: Mutex::new(()),
            dispatcher,
            state: Mutex::new(SessionState {
                connection: ConnectionState::Disconnected,
                sid: None,
                attempts: 0,
            }),
            state_tx,
            awaiting_pong,
            generation: Mutex::new(None),
            run: StdMutex::new(CancellationToken::new()),
            generation_seq: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.connection
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Update the connection state and notify watchers.
    pub async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.lock().await;
        if state.connection != new_state {
            info!("[{}] socket state: {} -> {}", self.name, state.connection, new_state);
            state.connection = new_state;
            self.state_tx.send_replace(new_state);
        }
    }

    pub async fn socket_id(&self) -> Option<String> {
        self.state.lock().await.sid.clone()
    }

    pub async fn clear_socket_id(&self) {
        self.state.lock().await.sid = None;
    }

    pub async fn attempts(&self) -> u32 {
        self.state.lock().await.attempts
    }

    pub async fn set_attempts(&self, attempts: u32) {
        self.state.lock().await.attempts = attempts;
    }

    /// Reset the attempt counter and enter `Connecting` for an explicit
    /// connect request. Returns false if a session is already up or coming
    /// up.
    pub async fn begin_connect(&self) -> bool {
        let mut state = self.state.lock().await;
        if matches!(
            state.connection,
            ConnectionState::Connected | ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            return false;
        }
        info!("[{}] socket state: {} -> {}", self.name, state.connection, ConnectionState::Connecting);
        state.connection = ConnectionState::Connecting;
        state.attempts = 0;
        self.state_tx.send_replace(ConnectionState::Connecting);
        true
    }

    /// Record a completed OPEN handshake: store the sid, reset the attempt
    /// counter and enter `Connected` in one step.
    pub async fn record_open(&self, sid: String) {
        let mut state = self.state.lock().await;
        info!(
            "[{}] socket open (sid {sid}): {} -> {}",
            self.name,
            state.connection,
            ConnectionState::Connected
        );
        state.sid = Some(sid);
        state.attempts = 0;
        state.connection = ConnectionState::Connected;
        self.state_tx.send_replace(ConnectionState::Connected);
    }

    pub fn emit(&self, event: LifecycleEvent, data: Option<String>) {
        self.dispatcher.dispatch(SocketEvent::lifecycle(event, data));
    }

    pub fn dispatch(&self, event: SocketEvent) {
        self.dispatcher.dispatch(event);
    }

    pub fn send_packet(&self, packet: &Packet) {
        self.outbound.enqueue(packet.encode());
    }

    pub fn set_awaiting_pong(&self, awaiting: bool) {
        self.awaiting_pong.send_replace(awaiting);
    }

    pub fn pong_receiver(&self) -> watch::Receiver<bool> {
        self.awaiting_pong.subscribe()
    }

    /// Replace a cancelled run token with a fresh one.
    pub fn renew_run_token(&self) -> CancellationToken {
        let mut run = self.run.lock().unwrap_or_else(|p| p.into_inner());
        if run.is_cancelled() {
            *run = CancellationToken::new();
        }
        run.clone()
    }

    /// Stop every loop and any pending dial or backoff.
    pub fn cancel_run(&self) {
        self.run.lock().unwrap_or_else(|p| p.into_inner()).cancel();
    }

    pub fn next_generation_id(&self) -> u64 {
        self.generation_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Install a freshly started generation, retiring any leftover one.
    pub async fn install_generation(&self, generation: Generation) {
        let previous = self.generation.lock().await.replace(generation);
        if let Some(previous) = previous {
            warn!("[{}] generation {} was still installed", self.name, previous.id);
            self.stop_generation(previous).await;
        }
    }

    /// Cancel the current generation and wait for its loops to exit.
    pub async fn retire_generation(&self) {
        let current = self.generation.lock().await.take();
        if let Some(generation) = current {
            self.stop_generation(generation).await;
        }
    }

    async fn stop_generation(&self, generation: Generation) {
        debug!("[{}] retiring generation {}", self.name, generation.id);
        generation.cancel.cancel();
        for mut task in generation.tasks {
            if tokio::time::timeout(RETIRE_TIMEOUT, &mut task).await.is_err() {
                warn!("[{}] loop of generation {} did not stop, aborting", self.name, generation.id);
                task.abort();
            }
        }
    }

    /// The transport of the current generation, if it is still open.
    pub async fn live_transport(&self) -> Option<TransportHandle> {
        self.generation
            .lock()
            .await
            .as_ref()
            .map(|generation| generation.transport.clone())
            .filter(TransportHandle::is_open)
    }

    /// Stop the current generation's heartbeat without touching the
    /// transport.
    pub async fn stop_heartbeat(&self) {
        if let Some(generation) = self.generation.lock().await.as_ref() {
            generation.heartbeat.cancel();
        }
    }
}

/// Everything one loop of one generation needs.
#[derive(Clone)]
pub(crate) struct LoopContext {
    pub shared: Arc<Shared>,
    pub generation: u64,
    /// Generation token; cancelled when the generation is retired.
    pub cancel: CancellationToken,
    /// Client run token, handed to the connector when reconnecting.
    pub run: CancellationToken,
    /// Child of `cancel` that stops only the watchdog.
    pub heartbeat: CancellationToken,
    pub transport: TransportHandle,
    /// Set once this generation has seen an OPEN packet.
    pub ever_connected: Arc<AtomicBool>,
}

impl LoopContext {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn was_connected(&self) -> bool {
        self.ever_connected.load(Ordering::Acquire)
    }

    pub fn mark_connected(&self) {
        self.ever_connected.store(true, Ordering::Release);
    }

    /// Report a lost transport: enter `Error`, raise the matching failure
    /// event with `reason`, and abort the transport.
    ///
    /// During a local close (state already `Disconnected`) the transport is
    /// only aborted.
    pub async fn fail_transport(&self, reason: &str) {
        if self.shared.state().await == ConnectionState::Disconnected {
            debug!("[{}] transport ended ({reason}) while closing", self.name());
            self.transport.abort();
            return;
        }
        self.shared.clear_socket_id().await;
        let attempts = self.shared.attempts().await;
        let event = failure_event(self.was_connected(), attempts);
        warn!("[{}] transport lost ({reason}), raising {event}", self.name());
        self.shared.set_state(ConnectionState::Error).await;
        self.shared.emit(event, Some(reason.to_string()));
        self.transport.abort();
    }
}

/// Which event reports a transport failure.
///
/// A session that completed its handshake reports `disconnect`; otherwise
/// the failure counts against the current dial attempt.
pub(crate) fn failure_event(ever_connected: bool, attempts: u32) -> LifecycleEvent {
    if ever_connected {
        LifecycleEvent::Disconnect
    } else if attempts > 0 {
        LifecycleEvent::ReconnectError
    } else {
        LifecycleEvent::ConnectError
    }
}

/// A loop context for one unstarted generation, with no socket behind its
/// transport handle.
#[cfg(test)]
pub(crate) fn test_context(options: ClientOptions) -> (LoopContext, crate::events::EventPump) {
    let (dispatcher, pump) = crate::events::event_channel();
    let target = Url::parse("ws://127.0.0.1:1/socket.io/?EIO=3&transport=websocket")
        .expect("static url");
    let shared = Arc::new(Shared::new("test".into(), target, options, dispatcher));
    let run = CancellationToken::new();
    let cancel = run.child_token();
    let ctx = LoopContext {
        shared,
        generation: 1,
        heartbeat: cancel.child_token(),
        transport: TransportHandle::new(cancel.child_token()),
        cancel,
        run,
        ever_connected: Arc::new(AtomicBool::new(false)),
    };
    (ctx, pump)
}
