//! sio-socket - Engine.IO v3 / Socket.IO v2 client over WebSocket.
//!
//! This crate provides the protocol client engine that handles:
//! - Packet encoding and decoding for both protocol layers
//! - Dialing with linear backoff and an attempt ceiling
//! - Reader, writer and heartbeat loops per connection generation
//! - Reconnection after heartbeat or transport failure
//! - An ordered outbound queue that drops stale frames
//! - Event delivery through a queue the consumer pumps

mod connector;
mod reader;
mod session;
mod watchdog;
mod writer;

pub mod events;
pub mod manager;
pub mod packet;
pub mod queue;
pub mod transport;

// Re-export key types
pub use events::{ConnectionState, EventDispatcher, EventHandler, EventPump, LifecycleEvent, SocketEvent};
pub use manager::{ClientOptions, HeartbeatConfig, ReconnectConfig, SocketManager};
pub use packet::{EnginePacketType, EventData, OpenHandshake, Packet, SocketPacketType};
