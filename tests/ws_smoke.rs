//! Socket-level smoke tests
//!
//! Runs the real connection handler over a loopback TCP listener and talks
//! to it with a WebSocket client, covering the paths the in-process lobby
//! tests cannot: upgrade, the ordered request/response loop, close cleanup,
//! and shutdown draining.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tavern::config::ServerConfig;
use tavern::net::handler;
use tavern::state::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bind a loopback listener and serve connections with the real handler
async fn start_server() -> (Arc<AppState>, SocketAddr) {
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = Arc::new(AppState::new(ServerConfig::default(), shutdown_tx));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept_state = state.clone();
    tokio::spawn(async move {
        while let Ok((stream, peer)) = listener.accept().await {
            let state = accept_state.clone();
            tokio::spawn(async move {
                let _ = handler::handle_connection(state, stream, peer).await;
            });
        }
    });

    (state, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    client
}

/// Send one frame and await its single response
async fn roundtrip(client: &mut Client, raw: &str) -> String {
    client.send(Message::Text(raw.to_string())).await.unwrap();
    loop {
        match client.next().await.expect("connection ended").unwrap() {
            Message::Text(text) => return text,
            // Control frames may interleave; responses are always text
            _ => continue,
        }
    }
}

/// Poll until `predicate` holds or the deadline passes
async fn wait_until<F: Fn() -> bool>(predicate: F, what: &str) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn full_lobby_flow_over_websocket() {
    let (state, addr) = start_server().await;

    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    wait_until(|| state.connections.count() == 2, "both connections").await;

    // Identities are server-assigned 64-hex tokens, echoed by registration
    let response = roundtrip(&mut alice, "misc/registration/alice").await;
    let (head, alice_id) = response.rsplit_once('/').unwrap();
    assert_eq!(head, "1/misc/registration");
    assert_eq!(alice_id.len(), 64);

    let response = roundtrip(&mut bob, "misc/registration/bob").await;
    assert!(response.starts_with("1/misc/registration/"));

    let response = roundtrip(&mut alice, "misc/create_session/room/2/").await;
    let (head, session_id) = response.rsplit_once('/').unwrap();
    assert_eq!(head, "1/misc/create_session");

    let join = format!("misc/connect_to_session/{session_id}");
    assert_eq!(
        roundtrip(&mut alice, &join).await,
        "1/misc/connect_to_session/"
    );
    assert_eq!(
        roundtrip(&mut bob, &join).await,
        "1/misc/connect_to_session/"
    );

    roundtrip(&mut alice, "game/data_exchange/x=1").await;
    let response = roundtrip(&mut bob, "game/data_exchange/x=2").await;
    assert!(response.starts_with("1/game/data_exchange/2|"));
    assert!(response.contains("x=1"));

    assert_eq!(state.lobby.player_count(), 2);
    assert_eq!(state.lobby.session_members(session_id).unwrap(), 2);
}

#[tokio::test]
async fn responses_stay_in_request_order() {
    let (_state, addr) = start_server().await;
    let mut client = connect(addr).await;

    // Queue several frames before reading; replies must come back in order
    for raw in [
        "misc/registration/nyra",
        "misc/get_sessions_list",
        "misc/teleport/home",
    ] {
        client.send(Message::Text(raw.to_string())).await.unwrap();
    }

    let first = next_text(&mut client).await;
    assert!(first.starts_with("1/misc/registration/"));
    let second = next_text(&mut client).await;
    assert_eq!(second, "1/misc/get_sessions_list/0");
    let third = next_text(&mut client).await;
    assert_eq!(third, "400/misc/teleport/Wrong subflag");
}

async fn next_text(client: &mut Client) -> String {
    loop {
        match client.next().await.expect("connection ended").unwrap() {
            Message::Text(text) => return text,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn client_disconnect_clears_lobby_state() {
    let (state, addr) = start_server().await;

    let mut alice = connect(addr).await;
    roundtrip(&mut alice, "misc/registration/alice").await;
    let response = roundtrip(&mut alice, "misc/create_session/room/2/").await;
    let session_id = response.rsplit_once('/').unwrap().1.to_string();
    roundtrip(&mut alice, &format!("misc/connect_to_session/{session_id}")).await;

    assert_eq!(state.lobby.player_count(), 1);
    alice.close(None).await.unwrap();

    wait_until(|| state.lobby.player_count() == 0, "player removal").await;
    wait_until(|| state.connections.count() == 0, "connection removal").await;
    // The session outlives its last member, empty
    assert_eq!(state.lobby.session_members(&session_id).unwrap(), 0);
}

#[tokio::test]
async fn shutdown_force_closes_clients() {
    let (state, addr) = start_server().await;

    let mut client = connect(addr).await;
    roundtrip(&mut client, "misc/registration/alice").await;

    state.connections.shutdown().await;
    assert_eq!(state.connections.count(), 0);

    // The client observes the close rather than hanging
    loop {
        match client.next().await {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => continue,
        }
    }
}
