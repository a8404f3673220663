//! WebSocket transport: handshake URL construction, dialing, and split
//! reader/writer halves over a tokio-tungstenite stream.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use sio_core::constants::{HANDSHAKE_QUERY, SOCKET_IO_PATH};
use sio_core::error::{SioError, SioResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the WebSocket handshake URL for a server address.
///
/// `http`/`ws` map to `ws`, `https`/`wss` map to `wss`. The path is always
/// `/socket.io/` and the query carries the protocol selector, then any query
/// already present on the address, then `extra_query`.
pub fn build_target_url(address: &str, extra_query: &str) -> SioResult<Url> {
    let base = Url::parse(address)
        .map_err(|e| SioError::InvalidUrl(format!("{address}: {e}")))?;

    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SioError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {address}"
            )))
        }
    };
    let host = base
        .host_str()
        .ok_or_else(|| SioError::InvalidUrl(format!("missing host in {address}")))?;

    let mut target = format!("{scheme}://{host}");
    if let Some(port) = base.port() {
        target.push_str(&format!(":{port}"));
    }
    target.push_str(SOCKET_IO_PATH);
    target.push('?');
    target.push_str(HANDSHAKE_QUERY);
    for query in [base.query().unwrap_or_default(), extra_query] {
        let query = query.trim_start_matches(['?', '&']);
        if !query.is_empty() {
            target.push('&');
            target.push_str(query);
        }
    }

    Url::parse(&target).map_err(|e| SioError::InvalidUrl(format!("{target}: {e}")))
}

/// A frame received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete (reassembled) text message.
    Text(String),
    /// A binary message; only its size is kept.
    Binary(usize),
    /// The server's WebSocket close frame, with its reason if any.
    Close(Option<String>),
    /// Ping/pong control frames, answered by tungstenite itself.
    Control,
}

/// Shared liveness flag for one transport.
///
/// Both halves observe it: aborting makes the reader and writer stop using
/// the socket, and `closed()` lets other tasks wait for that moment.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    closed: CancellationToken,
}

impl TransportHandle {
    pub fn new(closed: CancellationToken) -> Self {
        Self { closed }
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Mark the transport as closed. Idempotent.
    pub fn abort(&self) {
        self.closed.cancel();
    }

    /// Resolve once the transport is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// An open WebSocket split into its two halves.
pub struct TransportSession {
    pub reader: FrameReader,
    pub writer: FrameWriter,
    pub handle: TransportHandle,
}

impl TransportSession {
    /// Dial `url` and complete the WebSocket handshake.
    ///
    /// `closed` becomes the transport's liveness token; cancelling it (or a
    /// parent) aborts the transport.
    pub async fn open(
        url: &Url,
        connect_timeout: Duration,
        max_message_size: usize,
        closed: CancellationToken,
    ) -> SioResult<Self> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max_message_size);
        config.max_frame_size = Some(max_message_size);

        let dial = tokio_tungstenite::connect_async_with_config(url.as_str(), Some(config), true);
        let (stream, response) = tokio::time::timeout(connect_timeout, dial)
            .await
            .map_err(|_| {
                SioError::Timeout(format!("websocket handshake with {url} after {connect_timeout:?}"))
            })?
            .map_err(|e| SioError::Transport(format!("failed to connect to {url}: {e}")))?;
        debug!("websocket handshake complete: {}", response.status());

        let handle = TransportHandle::new(closed);
        let (sink, stream) = stream.split();
        Ok(Self {
            reader: FrameReader {
                stream,
                handle: handle.clone(),
            },
            writer: FrameWriter {
                sink,
                handle: handle.clone(),
            },
            handle,
        })
    }
}

/// Receiving half of a transport.
pub struct FrameReader {
    stream: SplitStream<WsStream>,
    handle: TransportHandle,
}

impl FrameReader {
    /// Wait for the next frame from the server.
    ///
    /// Returns [`SioError::TransportClosed`] when the stream ends or the
    /// transport was aborted.
    pub async fn next_frame(&mut self) -> SioResult<Frame> {
        let message = tokio::select! {
            _ = self.handle.closed() => return Err(SioError::TransportClosed),
            message = self.stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => Ok(Frame::Text(text.as_str().to_owned())),
            Some(Ok(Message::Binary(data))) => Ok(Frame::Binary(data.len())),
            Some(Ok(Message::Close(frame))) => {
                Ok(Frame::Close(frame.map(|f| f.reason.as_str().to_owned())))
            }
            Some(Ok(_)) => Ok(Frame::Control),
            Some(Err(e)) => Err(map_ws_error(e)),
            None => Err(SioError::TransportClosed),
        }
    }
}

/// Sending half of a transport.
pub struct FrameWriter {
    sink: SplitSink<WsStream, Message>,
    handle: TransportHandle,
}

impl FrameWriter {
    /// Send one complete text frame.
    pub async fn send_text(&mut self, text: &str) -> SioResult<()> {
        if !self.handle.is_open() {
            return Err(SioError::TransportClosed);
        }
        self.sink
            .send(Message::text(text.to_owned()))
            .await
            .map_err(map_ws_error)
    }
}

fn map_ws_error(err: WsError) -> SioError {
    match err {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            SioError::TransportClosed
        }
        other => SioError::Transport(other.to_string()),
    }
}
