//! Application state module
//!
//! Contains the shared state used across all server connections.

use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::game::GameServer;
use crate::net::connection::ConnectionRegistry;

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Connection registry for tracking connected clients
    pub connections: ConnectionRegistry,
    /// Player and session registries plus the request handlers
    pub lobby: GameServer,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            config,
            connections: ConnectionRegistry::new(),
            lobby: GameServer::new(),
            shutdown_tx,
        }
    }
}
