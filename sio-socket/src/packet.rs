//! Engine.IO v3 / Socket.IO v2 packet codec.
//!
//! A frame on the wire is
//! `<engine type>[<socket type>][<namespace>,][<ack id>]<payload>`, where the
//! socket type, namespace and ack id only exist for MESSAGE packets. The
//! default namespace `/` and a missing ack id are omitted when encoding.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use sio_core::constants::DEFAULT_NAMESPACE;
use sio_core::error::{SioError, SioResult};

/// Outer (Engine.IO) packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnginePacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
}

impl EnginePacketType {
    /// Parse the leading type digit of a frame.
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'0' => Some(Self::Open),
            b'1' => Some(Self::Close),
            b'2' => Some(Self::Ping),
            b'3' => Some(Self::Pong),
            b'4' => Some(Self::Message),
            _ => None,
        }
    }

    /// The wire digit for this type.
    pub fn as_digit(&self) -> char {
        match self {
            Self::Open => '0',
            Self::Close => '1',
            Self::Ping => '2',
            Self::Pong => '3',
            Self::Message => '4',
        }
    }
}

/// Inner (Socket.IO) packet type, carried by MESSAGE packets only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketPacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    Error,
}

impl SocketPacketType {
    /// Parse the socket type digit following a MESSAGE engine digit.
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'0' => Some(Self::Connect),
            b'1' => Some(Self::Disconnect),
            b'2' => Some(Self::Event),
            b'3' => Some(Self::Ack),
            b'4' => Some(Self::Error),
            _ => None,
        }
    }

    /// The wire digit for this type.
    pub fn as_digit(&self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::Error => '4',
        }
    }
}

/// A decoded protocol packet.
///
/// Packets are immutable values. The socket type, namespace and ack id are
/// only meaningful for [`EnginePacketType::Message`]; the constructors keep
/// them at their defaults for every other engine type.
///
/// A packet survives an encode/decode round trip when its namespace starts
/// with `/` and contains no `,`, and (for MESSAGE packets) its payload does
/// not start with an ASCII digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    engine_type: EnginePacketType,
    socket_type: Option<SocketPacketType>,
    namespace: String,
    id: Option<u64>,
    payload: String,
}

impl Packet {
    /// A non-MESSAGE packet with an optional payload (e.g. `2probe`).
    pub fn engine(engine_type: EnginePacketType, payload: impl Into<String>) -> Self {
        let mut packet = Self::bare(engine_type);
        if engine_type == EnginePacketType::Message {
            packet.socket_type = Some(SocketPacketType::Event);
        }
        packet.payload = payload.into();
        packet
    }

    /// A MESSAGE packet on the default namespace without an ack id.
    pub fn message(socket_type: SocketPacketType, payload: impl Into<String>) -> Self {
        Self {
            engine_type: EnginePacketType::Message,
            socket_type: Some(socket_type),
            namespace: DEFAULT_NAMESPACE.to_string(),
            id: None,
            payload: payload.into(),
        }
    }

    /// An EVENT packet carrying an already-encoded JSON array payload.
    pub fn event(payload: impl Into<String>) -> Self {
        Self::message(SocketPacketType::Event, payload)
    }

    pub fn ping() -> Self {
        Self::bare(EnginePacketType::Ping)
    }

    pub fn pong() -> Self {
        Self::bare(EnginePacketType::Pong)
    }

    pub fn close() -> Self {
        Self::bare(EnginePacketType::Close)
    }

    /// A Socket.IO DISCONNECT for the default namespace.
    pub fn disconnect() -> Self {
        Self::message(SocketPacketType::Disconnect, "")
    }

    fn bare(engine_type: EnginePacketType) -> Self {
        Self {
            engine_type,
            socket_type: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            id: None,
            payload: String::new(),
        }
    }

    /// Set the namespace. Ignored for non-MESSAGE packets.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        if self.engine_type == EnginePacketType::Message {
            self.namespace = namespace.into();
        }
        self
    }

    /// Set the ack id. Ignored for non-MESSAGE packets.
    pub fn with_id(mut self, id: u64) -> Self {
        if self.engine_type == EnginePacketType::Message {
            self.id = Some(id);
        }
        self
    }

    pub fn engine_type(&self) -> EnginePacketType {
        self.engine_type
    }

    pub fn socket_type(&self) -> Option<SocketPacketType> {
        self.socket_type
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn has_default_namespace(&self) -> bool {
        self.namespace == DEFAULT_NAMESPACE
    }

    /// Encode into the wire text format.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.payload.len() + 4);
        out.push(self.engine_type.as_digit());

        if let Some(socket_type) = self.socket_type {
            out.push(socket_type.as_digit());
            if !self.has_default_namespace() {
                out.push_str(&self.namespace);
                out.push(',');
            }
            if let Some(id) = self.id {
                out.push_str(&id.to_string());
            }
        }

        out.push_str(&self.payload);
        out
    }

    /// Decode a complete text frame.
    pub fn decode(text: &str) -> SioResult<Self> {
        let bytes = text.as_bytes();
        let Some(&first) = bytes.first() else {
            return Err(SioError::MalformedPacket("empty frame".into()));
        };
        let engine_type = EnginePacketType::from_digit(first).ok_or_else(|| {
            SioError::MalformedPacket(format!("invalid engine packet type in {text:?}"))
        })?;

        // The leading digit is ASCII, so slicing past it is on a char boundary.
        let rest = &text[1..];
        if engine_type != EnginePacketType::Message {
            return Ok(Self::engine(engine_type, rest));
        }

        let socket_type = rest
            .as_bytes()
            .first()
            .and_then(|&digit| SocketPacketType::from_digit(digit))
            .ok_or_else(|| {
                SioError::MalformedPacket(format!("invalid socket packet type in {text:?}"))
            })?;
        let mut rest = &rest[1..];

        let mut namespace = DEFAULT_NAMESPACE;
        if rest.starts_with('/') {
            match rest.find(',') {
                Some(end) => {
                    namespace = &rest[..end];
                    rest = &rest[end + 1..];
                }
                None => {
                    namespace = rest;
                    rest = "";
                }
            }
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            let id = rest[..digits].parse::<u64>().map_err(|e| {
                SioError::MalformedPacket(format!("invalid ack id in {text:?}: {e}"))
            })?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        Ok(Self {
            engine_type,
            socket_type: Some(socket_type),
            namespace: namespace.to_string(),
            id,
            payload: rest.to_string(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Packet {
    type Err = SioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Packet::decode(s)
    }
}

/// Encode a packet into wire text.
pub fn encode(packet: &Packet) -> String {
    packet.encode()
}

/// Decode wire text into a packet.
pub fn decode(text: &str) -> SioResult<Packet> {
    Packet::decode(text)
}

/// Handshake data carried by the OPEN packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenHandshake {
    /// Server-assigned session id.
    pub sid: String,
    /// Transports the server offers to upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Server heartbeat interval in milliseconds.
    #[serde(rename = "pingInterval", default)]
    pub ping_interval: u64,
    /// Server heartbeat timeout in milliseconds.
    #[serde(rename = "pingTimeout", default)]
    pub ping_timeout: u64,
}

impl OpenHandshake {
    /// Parse the JSON payload of an OPEN packet.
    pub fn parse(payload: &str) -> SioResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| SioError::ProtocolViolation(format!("invalid open handshake: {e}")))
    }
}

/// Data attached to an outgoing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventData<'a> {
    /// No data: `["name"]`.
    None,
    /// Text sent as a JSON string: `["name","text"]`.
    PlainText(&'a str),
    /// Raw JSON embedded as-is: `["name",{...}]`. Must be valid JSON.
    Json(&'a str),
}

impl<'a> EventData<'a> {
    /// Treat JSON objects and arrays as raw JSON and everything else as text.
    pub fn detect(data: &'a str) -> Self {
        match serde_json::from_str::<Value>(data) {
            Ok(Value::Object(_)) | Ok(Value::Array(_)) => EventData::Json(data),
            _ => EventData::PlainText(data),
        }
    }
}

/// Build the JSON array payload of an EVENT packet.
pub fn event_payload(name: &str, data: EventData<'_>) -> SioResult<String> {
    let name = Value::String(name.to_owned());
    match data {
        EventData::None => Ok(format!("[{name}]")),
        EventData::PlainText(text) => Ok(format!("[{name},{}]", Value::String(text.to_owned()))),
        EventData::Json(raw) => {
            serde_json::from_str::<serde::de::IgnoredAny>(raw)?;
            Ok(format!("[{name},{}]", raw.trim()))
        }
    }
}

/// Split an EVENT payload `[name, data?]` into its name and data.
///
/// String data is returned unquoted; any other JSON value is returned as JSON
/// text. Arguments past the first are ignored.
pub fn parse_event(payload: &str) -> SioResult<(String, Option<String>)> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| SioError::MalformedPacket(format!("event payload is not JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(SioError::MalformedPacket("event payload is not an array".into()));
    };
    if items.is_empty() {
        return Err(SioError::MalformedPacket("event payload is empty".into()));
    }

    let mut rest = items.into_iter();
    let name = match rest.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(SioError::MalformedPacket(
                "event name is not a string".into(),
            ))
        }
    };
    let data = rest.next().map(|value| match value {
        Value::String(text) => text,
        other => other.to_string(),
    });
    Ok((name, data))
}
