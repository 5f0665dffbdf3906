//! Networking module
//!
//! This module handles all network-related functionality for the Tavern server:
//! - Ephemeral identity generation
//! - Connection registry and send/close primitives
//! - Per-connection accept/read/write loops

pub mod connection;
pub mod handler;
pub mod ident;
