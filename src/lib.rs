//! Tavern Lobby Server Library
//!
//! This library provides the core functionality for the Tavern lobby server:
//! clients hold persistent WebSocket connections, register an identity, and
//! create or join capacity- and password-bounded sessions in which they
//! exchange per-tick game payloads.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - Player registry, sessions, and lobby handlers
//! - `net` - Connection registry and per-connection loops
//! - `protocol` - Wire frame parsing, routing, and responses

pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, TavernError};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
