//! Error types for the Socket.IO client.
//!
//! Every failure category of the client is unified into a single `SioError`
//! enum. Background loops never return these to API callers; they log them
//! and translate them into lifecycle events instead.

use thiserror::Error;

/// Convenience type alias for Results using SioError.
pub type SioResult<T> = Result<T, SioError>;

/// Unified error type for the Socket.IO client.
#[derive(Error, Debug)]
pub enum SioError {
    // -- Configuration errors --
    /// Failed to load or parse configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// The server address cannot be turned into a handshake URL.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    // -- Transport errors --
    /// Socket-level failure while opening, reading or writing.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport was closed by the peer or aborted locally.
    #[error("transport closed")]
    TransportClosed,

    // -- Protocol errors --
    /// A frame could not be decoded into a packet.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A well-formed packet arrived that is not valid in the current state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A heartbeat or connect deadline elapsed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The automatic reconnect ceiling was reached.
    #[error("reconnect attempts exhausted after {attempts} attempt(s)")]
    ReconnectExhausted {
        /// Number of failed attempts in the sequence.
        attempts: u32,
    },

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SioError {
    /// Whether this error means the transport is gone rather than faulty.
    pub fn is_transport_close(&self) -> bool {
        matches!(self, SioError::TransportClosed)
    }
}

impl From<serde_json::Error> for SioError {
    fn from(e: serde_json::Error) -> Self {
        SioError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for SioError {
    fn from(e: toml::de::Error) -> Self {
        SioError::Config(e.to_string())
    }
}
