//! Error handling module
//!
//! Defines custom error types for the Tavern server.

use std::io;

use thiserror::Error;

/// Main error type for the Tavern server
#[derive(Error, Debug)]
pub enum TavernError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Write queue full")]
    WriteQueueFull,
}

/// Protocol-specific errors
///
/// These never escape the dispatcher: each one is downgraded to a
/// status-400 response frame on the originating connection.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame had fewer than two '/'-separated fields
    #[error("Malformed frame")]
    MalformedFrame,

    /// No handler exists for the (flag, subflag) pair
    #[error("Unknown route: {flag}/{subflag}")]
    UnknownRoute { flag: String, subflag: String },

    /// A handler needed an argument that was absent or unparseable
    #[error("Wrong arguments: {0}")]
    WrongArguments(String),
}

/// Result type alias for Tavern operations
pub type Result<T> = std::result::Result<T, TavernError>;
