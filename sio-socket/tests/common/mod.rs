//! Shared test utilities for integration tests.
//!
//! [`MockServer`] is a scripted Engine.IO v3 / Socket.IO v2 server on
//! `127.0.0.1:0`. Every accepted connection gets the OPEN handshake (sid
//! `sid-<n>` for the n-th connection) followed by a namespace CONNECT. Text
//! frames from the client are recorded, pings are answered unless the
//! connection is configured to stay silent, and an engine CLOSE is answered
//! by closing the WebSocket.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::Message;

use sio_core::logging;
use sio_socket::{ClientOptions, SocketEvent, SocketManager};

/// Default wait for anything observable in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Commands pushed to the currently connected client.
#[derive(Debug)]
pub enum ServerCommand {
    /// Send a text frame.
    Send(String),
    /// Send a binary frame.
    SendBinary(Vec<u8>),
    /// Send one text message split over several WebSocket frames.
    SendFragmented(Vec<String>),
    /// Send a WebSocket close frame.
    Close,
    /// Drop the TCP connection without a closing handshake.
    Drop,
}

pub struct MockServer {
    pub address: String,
    frames: Mutex<mpsc::UnboundedReceiver<String>>,
    commands: mpsc::UnboundedSender<ServerCommand>,
    connections: Arc<AtomicUsize>,
    refusing: Arc<AtomicBool>,
}

impl MockServer {
    /// Start a server that answers every ping.
    pub async fn start() -> Self {
        Self::start_with_silent(0).await
    }

    /// Start a server whose first `silent` connections never answer pings.
    pub async fn start_with_silent(silent: usize) -> Self {
        Self::start_scripted(silent, Vec::new()).await
    }

    /// Start a server that sends `prelude` frames on every connection before
    /// the OPEN handshake.
    pub async fn start_with_prelude(prelude: &[&str]) -> Self {
        Self::start_scripted(0, prelude.iter().map(|f| f.to_string()).collect()).await
    }

    async fn start_scripted(silent: usize, prelude: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let address = format!("http://{}", listener.local_addr().unwrap());

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let commands_rx = Arc::new(Mutex::new(commands_rx));
        let connections = Arc::new(AtomicUsize::new(0));
        let refusing = Arc::new(AtomicBool::new(false));

        let counter = connections.clone();
        let refuse = refusing.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if refuse.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }
                let index = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let frames = frames_tx.clone();
                let commands = commands_rx.clone();
                let prelude = prelude.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let script = Script {
                        index,
                        answer_pings: index > silent,
                        prelude,
                    };
                    serve_connection(ws, script, frames, commands).await;
                });
            }
        });

        Self {
            address,
            frames: Mutex::new(frames_rx),
            commands: commands_tx,
            connections,
            refusing,
        }
    }

    /// Fail every later dial by dropping the TCP connection before the
    /// WebSocket handshake. Sessions already open are kept.
    pub fn refuse_new_connections(&self) {
        self.refusing.store(true, Ordering::SeqCst);
    }

    /// Push a command to the connected client.
    pub fn command(&self, command: ServerCommand) {
        self.commands.send(command).expect("mock server stopped");
    }

    pub fn send(&self, frame: &str) {
        self.command(ServerCommand::Send(frame.to_string()));
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next text frame from the client, skipping heartbeat pings.
    pub async fn next_frame(&self) -> String {
        let mut frames = self.frames.lock().await;
        loop {
            let frame = tokio::time::timeout(WAIT, frames.recv())
                .await
                .expect("timed out waiting for a client frame")
                .expect("mock server stopped");
            if frame != "2" {
                return frame;
            }
        }
    }

    /// Drain already-recorded frames, heartbeat pings included.
    pub async fn drain_frames(&self) -> Vec<String> {
        let mut frames = self.frames.lock().await;
        let mut drained = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            drained.push(frame);
        }
        drained
    }
}

/// Per-connection behaviour.
struct Script {
    index: usize,
    answer_pings: bool,
    prelude: Vec<String>,
}

async fn serve_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    script: Script,
    frames: mpsc::UnboundedSender<String>,
    commands: Arc<Mutex<mpsc::UnboundedReceiver<ServerCommand>>>,
) {
    let Script {
        index,
        answer_pings,
        prelude,
    } = script;
    let (mut sink, mut stream) = ws.split();
    let open = format!(
        r#"0{{"sid":"sid-{index}","upgrades":[],"pingInterval":25000,"pingTimeout":5000}}"#
    );
    let greeting = prelude.into_iter().chain([open, "40".to_string()]);
    for frame in greeting {
        if sink.send(Message::text(frame)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_string();
                    let _ = frames.send(text.clone());
                    if text == "2" && answer_pings {
                        let _ = sink.send(Message::text("3".to_string())).await;
                    } else if text == "1" {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
            command = async { commands.lock().await.recv().await } => match command {
                Some(ServerCommand::Send(frame)) => {
                    let _ = sink.send(Message::text(frame)).await;
                }
                Some(ServerCommand::SendBinary(data)) => {
                    let _ = sink.send(Message::binary(data)).await;
                }
                Some(ServerCommand::SendFragmented(parts)) => {
                    let last = parts.len().saturating_sub(1);
                    for (i, part) in parts.into_iter().enumerate() {
                        let opcode = if i == 0 { Data::Text } else { Data::Continue };
                        let frame = Frame::message(part.into_bytes(), OpCode::Data(opcode), i == last);
                        let _ = sink.feed(Message::Frame(frame)).await;
                    }
                    let _ = sink.flush().await;
                }
                Some(ServerCommand::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
                Some(ServerCommand::Drop) | None => return,
            },
        }
    }
}

/// Client options with short timings suited to tests.
pub fn fast_options() -> ClientOptions {
    let mut options = ClientOptions::default();
    options.heartbeat.interval = Duration::from_millis(100);
    options.heartbeat.jitter = Duration::from_millis(10);
    options.heartbeat.ping_timeout = Duration::from_millis(300);
    options.reconnect.retry_base = Duration::from_millis(10);
    options.reconnect.retry_step = Duration::from_millis(10);
    options.reconnect.recovery_base = Duration::from_millis(10);
    options.reconnect.recovery_step = Duration::from_millis(10);
    options.reconnect.recovery_jitter = Duration::from_millis(5);
    options.connect_timeout = Duration::from_secs(2);
    options.close_flush_timeout = Duration::from_millis(500);
    options
}

pub fn create_client(address: &str, options: ClientOptions) -> SocketManager {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    logging::init_console_logging(&level);
    SocketManager::new("test", address, options).expect("failed to create client")
}

/// Wait for the event named `name`, returning it together with the names of
/// every event seen on the way (the target included).
pub async fn wait_for_event(client: &SocketManager, name: &str) -> (SocketEvent, Vec<String>) {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, client.next_event())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for '{name}', saw {seen:?}"))
            .expect("event queue closed");
        seen.push(event.name.clone());
        if event.name == name {
            return (event, seen);
        }
    }
}

/// Connect and wait until the session is usable.
pub async fn connect(client: &SocketManager) -> Vec<String> {
    client.connect().await;
    wait_for_event(client, "connect").await.1
}

/// Bind and release a port so that dialing it is refused.
pub async fn refused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    address
}
