//! Lobby module
//!
//! This module contains the player registry, the session state machine, and
//! the lobby server that ties them together:
//! - Player registration and lookup
//! - Session creation, capacity/password admission, membership
//! - Per-session game-data aggregation

pub mod player;
pub mod server;
pub mod session;

pub use server::GameServer;
