//! Socket.IO client core - foundation types shared by the client crates.
//!
//! This crate provides:
//! - Application configuration (server address, socket timing, logging)
//! - The error taxonomy used across the protocol client
//! - Structured logging with tracing
//! - Engine.IO / Socket.IO protocol constants

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{SioError, SioResult};
pub use logging::init_logging;
