//! Integration tests for the presentation relay: registration, broadcast
//! fan-out, arrival/departure notifications, ping/pong, and error acks.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use stagelink_server::config::RelayConfig;
use stagelink_server::relay::registry::Role;
use stagelink_server::relay::{dispatch, RelayState};
use stagelink_server::routes;
use stagelink_server::state::AppState;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Helper: start the relay on a random port.
async fn start_test_server() -> (SocketAddr, Arc<RelayState>) {
    let relay = RelayState::new(RelayConfig::default());
    relay.start();

    let app = routes::build_router(AppState {
        relay: relay.clone(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, relay)
}

async fn connect(addr: SocketAddr, client_id: &str) -> WsStream {
    let ws_url = format!("ws://{}/ws?client={}", addr, client_id);
    let (stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    stream
}

async fn send_frame(ws: &mut WsStream, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("Failed to send frame");
}

/// Next JSON text frame, skipping transport-level ping/pong.
async fn recv_frame(ws: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timed out waiting for frame")
            .expect("Stream ended")
            .expect("WebSocket receive error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("Invalid JSON frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}

/// Next JSON frame off a display-side relay channel.
async fn recv_relay_frame(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<axum::extract::ws::Message>,
) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timed out waiting for relay frame")
        .expect("Relay channel closed");
    match msg {
        axum::extract::ws::Message::Text(text) => {
            serde_json::from_str(&text).expect("Invalid JSON frame")
        }
        other => panic!("Unexpected frame: {:?}", other),
    }
}

async fn register(ws: &mut WsStream, frame_type: &str) {
    send_frame(ws, json!({ "type": frame_type })).await;
    let ack = recv_frame(ws).await;
    assert_eq!(ack["type"], "ack", "Expected ack, got {}", ack);
    assert_eq!(ack["success"], true, "Registration failed: {}", ack);
}

#[tokio::test]
async fn test_control_drives_display() {
    let (addr, _relay) = start_test_server().await;

    let mut control = connect(addr, "control-1").await;
    register(&mut control, "registerControl").await;

    let mut display = connect(addr, "display-1").await;
    register(&mut display, "registerPresentation").await;

    // Control is told about the display's arrival
    let arrival = recv_frame(&mut control).await;
    assert_eq!(arrival["type"], "presentationConnected");
    assert_eq!(arrival["id"], "display-1");

    // Control pushes a selection; it is acked and fanned out verbatim
    send_frame(
        &mut control,
        json!({
            "type": "presentationUpdate",
            "payload": { "song": "s1", "segment": "seg1" }
        }),
    )
    .await;
    let ack = recv_frame(&mut control).await;
    assert_eq!(ack["success"], true);

    let update = recv_frame(&mut display).await;
    assert_eq!(update["type"], "presentationUpdate");
    assert_eq!(update["payload"], json!({ "song": "s1", "segment": "seg1" }));
}

#[tokio::test]
async fn test_updates_arrive_in_issue_order() {
    let (addr, _relay) = start_test_server().await;

    let mut control = connect(addr, "control-1").await;
    register(&mut control, "registerControl").await;

    let mut display = connect(addr, "display-1").await;
    register(&mut display, "registerPresentation").await;
    recv_frame(&mut control).await; // arrival notification

    for n in 1..=5 {
        send_frame(
            &mut control,
            json!({ "type": "presentationUpdate", "payload": { "segment": n } }),
        )
        .await;
        recv_frame(&mut control).await; // ack
    }

    for n in 1..=5 {
        let update = recv_frame(&mut display).await;
        assert_eq!(update["payload"]["segment"], n, "Out-of-order update");
    }
}

#[tokio::test]
async fn test_display_departure_notifies_control() {
    let (addr, _relay) = start_test_server().await;

    let mut control = connect(addr, "control-1").await;
    register(&mut control, "registerControl").await;

    let mut display = connect(addr, "display-1").await;
    register(&mut display, "registerPresentation").await;

    let arrival = recv_frame(&mut control).await;
    assert_eq!(arrival["type"], "presentationConnected");

    display
        .send(Message::Close(None))
        .await
        .expect("Failed to send close");

    let departure = recv_frame(&mut control).await;
    assert_eq!(departure["type"], "presentationDisconnected");
    assert_eq!(departure["id"], "display-1");
}

#[tokio::test]
async fn test_explicit_null_payload_forwarded_verbatim() {
    let (addr, _relay) = start_test_server().await;

    let mut control = connect(addr, "control-1").await;
    register(&mut control, "registerControl").await;

    let mut display = connect(addr, "display-1").await;
    register(&mut display, "registerPresentation").await;
    recv_frame(&mut control).await; // arrival notification

    // Clearing the displayed content: both references explicitly null
    send_frame(
        &mut control,
        json!({
            "type": "presentationUpdate",
            "payload": { "song": null, "segment": null }
        }),
    )
    .await;
    recv_frame(&mut control).await; // ack

    let update = recv_frame(&mut display).await;
    assert_eq!(update["payload"], json!({ "song": null, "segment": null }));
}

#[tokio::test]
async fn test_update_from_unregistered_connection_rejected() {
    let (addr, _relay) = start_test_server().await;

    let mut conn = connect(addr, "nobody").await;
    send_frame(
        &mut conn,
        json!({ "type": "presentationUpdate", "payload": { "song": "s1" } }),
    )
    .await;

    let ack = recv_frame(&mut conn).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["success"], false);
    assert!(ack["error"].is_string());
}

#[tokio::test]
async fn test_display_cannot_broadcast() {
    let (addr, _relay) = start_test_server().await;

    let mut display = connect(addr, "display-1").await;
    register(&mut display, "registerPresentation").await;

    send_frame(
        &mut display,
        json!({ "type": "presentationUpdate", "payload": { "song": "s1" } }),
    )
    .await;

    let ack = recv_frame(&mut display).await;
    assert_eq!(ack["success"], false);
}

#[tokio::test]
async fn test_malformed_frame_gets_error_ack_and_connection_survives() {
    let (addr, _relay) = start_test_server().await;

    let mut conn = connect(addr, "control-1").await;
    send_frame(&mut conn, json!({ "type": "definitelyNotAThing" })).await;

    let ack = recv_frame(&mut conn).await;
    assert_eq!(ack["success"], false);

    // Connection stays open and unassigned; a real registration still works
    register(&mut conn, "registerControl").await;
}

#[tokio::test]
async fn test_ping_pong() {
    let (addr, _relay) = start_test_server().await;

    let mut conn = connect(addr, "pinger").await;

    conn.send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), conn.next())
        .await
        .expect("Expected pong within timeout")
        .expect("Stream ended")
        .expect("WebSocket receive error");

    match msg {
        Message::Pong(data) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_reconnect_under_same_id_is_clean() {
    let (addr, _relay) = start_test_server().await;

    let mut control = connect(addr, "control-1").await;
    register(&mut control, "registerControl").await;

    {
        let mut display = connect(addr, "display-1").await;
        register(&mut display, "registerPresentation").await;
        recv_frame(&mut control).await; // arrival

        display
            .send(Message::Close(None))
            .await
            .expect("Failed to send close");
        recv_frame(&mut control).await; // departure
    }

    // Same id comes back; control sees a fresh arrival and updates flow
    let mut display = connect(addr, "display-1").await;
    register(&mut display, "registerPresentation").await;
    let arrival = recv_frame(&mut control).await;
    assert_eq!(arrival["type"], "presentationConnected");
    assert_eq!(arrival["id"], "display-1");

    send_frame(
        &mut control,
        json!({ "type": "presentationUpdate", "payload": { "segment": "seg2" } }),
    )
    .await;
    recv_frame(&mut control).await; // ack

    let update = recv_frame(&mut display).await;
    assert_eq!(update["payload"]["segment"], "seg2");
}

#[tokio::test]
async fn test_unreachable_display_catches_up_after_transport_loss() {
    let (addr, relay) = start_test_server().await;

    let mut control = connect(addr, "control-1").await;
    register(&mut control, "registerControl").await;

    // Display whose transport the test controls directly, registered through
    // the same relay operations the socket actors use. A graceful close
    // tears the mailbox down with the session, so the away window needs a
    // transport that dies without the registry noticing.
    let (display_tx, mut display_rx) = tokio::sync::mpsc::unbounded_channel();
    dispatch::open_connection(&relay, "display-1", display_tx);
    dispatch::register(&relay, "display-1", Role::Display).unwrap();
    recv_frame(&mut control).await; // arrival notification

    send_frame(
        &mut control,
        json!({ "type": "presentationUpdate", "payload": { "segment": 1 } }),
    )
    .await;
    recv_frame(&mut control).await; // ack
    let first = recv_relay_frame(&mut display_rx).await;
    assert_eq!(first["payload"]["segment"], 1);

    // Transport dies abruptly; updates sent over the wire queue up
    drop(display_rx);
    for n in 2..=3 {
        send_frame(
            &mut control,
            json!({ "type": "presentationUpdate", "payload": { "segment": n } }),
        )
        .await;
        let ack = recv_frame(&mut control).await;
        assert_eq!(ack["success"], true, "Broadcast to a dead target must still ack");
    }
    assert_eq!(relay.mailboxes.pending("display-1"), 2);

    // Reconnect under the same id: the backlog replays in order, once
    let (display_tx2, mut display_rx2) = tokio::sync::mpsc::unbounded_channel();
    dispatch::open_connection(&relay, "display-1", display_tx2);
    dispatch::register(&relay, "display-1", Role::Display).unwrap();
    recv_frame(&mut control).await; // fresh arrival notification

    for n in 2..=3 {
        let update = recv_relay_frame(&mut display_rx2).await;
        assert_eq!(update["payload"]["segment"], n, "Replay out of order");
    }
    assert_eq!(relay.mailboxes.pending("display-1"), 0);

    // A later update over the wire arrives live, with no replays
    send_frame(
        &mut control,
        json!({ "type": "presentationUpdate", "payload": { "segment": 4 } }),
    )
    .await;
    recv_frame(&mut control).await; // ack

    let live = recv_relay_frame(&mut display_rx2).await;
    assert_eq!(live["payload"]["segment"], 4);
}
