//! Connection handler module
//!
//! Handles the lifecycle of client connections:
//! - WebSocket upgrade (plain or TLS-wrapped stream, one generic code path)
//! - One writer task per connection draining the outbound queue (the single
//!   writer for that socket)
//! - The receive loop: one frame in, one dispatch, one response out, in
//!   strict order; no pipelining within a connection
//! - Cleanup of player and session state when the connection ends

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::{NetworkError, Result, TavernError};
use crate::net::connection::Connection;
use crate::protocol::dispatcher;
use crate::protocol::frame::{Response, Status};
use crate::AppState;

/// Handle one client connection from upgrade to cleanup
pub async fn handle_connection<S>(state: Arc<AppState>, stream: S, addr: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| TavernError::Network(NetworkError::WebSocket(e.to_string())))?;

    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.send_queue);
    let connection = state.connections.register(addr, outbound_tx)?;
    let ident = connection.ident.clone();

    info!(client_id = %ident, address = %addr, "WebSocket connection established");

    let (sink, stream) = ws_stream.split();
    let writer = tokio::spawn(write_loop(sink, outbound_rx));

    let result = read_loop(&state, &connection, stream).await;

    // Cleanup order: lobby state first, then the connection record. Dropping
    // the last Connection reference closes the outbound queue, which ends
    // the writer task.
    debug!(client_id = %ident, "Connection handler ending");
    state.lobby.remove_player(&ident);
    state.connections.unregister(&ident);
    drop(connection);
    let _ = writer.await;

    result
}

/// Drain the outbound queue into the WebSocket sink
async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound_rx: mpsc::Receiver<Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = outbound_rx.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if sink.send(message).await.is_err() {
            break;
        }
        if is_close {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Receive loop: strictly one frame at a time. The dispatcher call completes
/// and its response is queued before the next frame is read.
async fn read_loop<S>(
    state: &Arc<AppState>,
    connection: &Arc<Connection>,
    mut stream: SplitStream<WebSocketStream<S>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = connection.wait_closed() => {
                debug!(client_id = %connection.ident, "Connection force-closed");
                return Ok(());
            }
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                respond(state, connection, &text).await?;
            }
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => respond(state, connection, &text).await?,
                Err(_) => {
                    // Binary garbage is a parse failure, not a disconnect
                    let response = Response::new(
                        Status::DispatchError,
                        "",
                        "",
                        vec!["Malformed frame".to_string()],
                    );
                    connection.send(response.encode()).await?;
                }
            },
            Some(Ok(Message::Ping(data))) => {
                if let Err(e) = connection.try_send(Message::Pong(data)) {
                    warn!(client_id = %connection.ident, error = %e, "Failed to queue pong");
                }
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) => {
                debug!(client_id = %connection.ident, "Close frame received");
                connection.mark_closed();
                return Ok(());
            }
            Some(Ok(Message::Frame(_))) => {
                // Raw frames do not surface from a configured tungstenite stream
            }
            Some(Err(e)) => {
                connection.mark_closed();
                return Err(TavernError::Network(NetworkError::WebSocket(e.to_string())));
            }
            None => {
                debug!(client_id = %connection.ident, "Transport closed");
                connection.mark_closed();
                return Ok(());
            }
        }
    }
}

/// Dispatch one frame and queue its single response
async fn respond(state: &Arc<AppState>, connection: &Arc<Connection>, raw: &str) -> Result<()> {
    trace!(client_id = %connection.ident, len = raw.len(), "Frame received");
    let response = dispatcher::dispatch(&state.lobby, raw, &connection.ident);
    connection.send(response).await
}
