//! Tavern Lobby Server
//!
//! Accepts persistent WebSocket connections, registers player identities,
//! and coordinates capacity- and password-bounded game sessions.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tokio_native_tls::TlsAcceptor;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tavern::config::ServerConfig;
use tavern::net::handler;
use tavern::state::AppState;
use tavern::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Tavern lobby server v{}", VERSION);

    // Load configuration
    let config = ServerConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Optional TLS; certificate material is opaque deployment input
    let tls_acceptor = build_tls_acceptor(&config).await?;
    if tls_acceptor.is_some() {
        info!("TLS enabled");
    }

    // Initialize application state
    let state = Arc::new(AppState::new(config.clone(), shutdown_tx.clone()));

    // Start the lobby listener
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_addr()))?;
    let listener = TcpListener::bind(addr).await?;
    info!("Lobby server listening on: {}", addr);

    // Spawn the connection acceptor
    let accept_state = state.clone();
    let mut accept_shutdown_rx = shutdown_tx.subscribe();
    let accept_handle = tokio::spawn(async move {
        accept_connections(listener, tls_acceptor, accept_state, &mut accept_shutdown_rx).await;
    });

    info!("Server startup complete, {} is ready", config.server_name);

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");

    // Stop accepting, then force-close every connection and wait for the
    // receive loops to terminate
    let _ = accept_handle.await;
    state.connections.shutdown().await;

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tavern=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Build a TLS acceptor from the configured certificate and key
async fn build_tls_acceptor(config: &ServerConfig) -> Result<Option<TlsAcceptor>> {
    let Some(tls) = &config.tls else {
        return Ok(None);
    };

    let cert = tokio::fs::read(&tls.cert_file)
        .await
        .with_context(|| format!("Failed to read TLS cert: {}", tls.cert_file.display()))?;
    let key = tokio::fs::read(&tls.key_file)
        .await
        .with_context(|| format!("Failed to read TLS key: {}", tls.key_file.display()))?;

    let identity = native_tls::Identity::from_pkcs8(&cert, &key)
        .context("Failed to parse TLS certificate/key pair")?;
    let acceptor = native_tls::TlsAcceptor::new(identity).context("Failed to build TLS acceptor")?;

    Ok(Some(TlsAcceptor::from(acceptor)))
}

/// Accept incoming connections until shutdown
async fn accept_connections(
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    state: Arc<AppState>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!("New connection from: {}", addr);
                        let state = state.clone();
                        let tls_acceptor = tls_acceptor.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(state, tls_acceptor, stream, addr).await {
                                warn!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Connection acceptor shutting down");
                break;
            }
        }
    }
}

/// Optionally TLS-wrap the stream, then hand it to the connection handler
async fn serve_connection(
    state: Arc<AppState>,
    tls_acceptor: Option<TlsAcceptor>,
    stream: tokio::net::TcpStream,
    addr: SocketAddr,
) -> tavern::Result<()> {
    stream.set_nodelay(true)?;

    match tls_acceptor {
        Some(acceptor) => {
            let tls_stream = acceptor.accept(stream).await.map_err(|e| {
                tavern::TavernError::Network(tavern::error::NetworkError::Tls(e.to_string()))
            })?;
            handler::handle_connection(state, tls_stream, addr).await
        }
        None => handler::handle_connection(state, stream, addr).await,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
