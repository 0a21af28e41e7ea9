// End-to-end tests over real sockets: axum server on an ephemeral port,
// tokio-tungstenite clients driving the wire protocol.

use futures::{SinkExt, StreamExt};
use relay::api::{create_ws_router, WsAppState};
use relay::client::{ChatClient, ClientEvent, ReconnectPolicy};
use relay::registry::{BroadcastPolicy, ConnectionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawn a relay on an ephemeral port; returns the ws URL.
async fn spawn_relay(policy: BroadcastPolicy) -> String {
    let registry = Arc::new(ConnectionRegistry::new(policy, 64, Duration::from_secs(5)));
    let state = Arc::new(WsAppState { registry });
    let app = create_ws_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://{}/ws", addr)
}

async fn connect(url: &str) -> WsClient {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Next text frame, skipping transport-level frames.
async fn recv_text(ws: &mut WsClient) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(t) = frame {
            return t.as_str().to_string();
        }
    }
}

/// Assert no text frame arrives within the window.
async fn assert_no_text(ws: &mut WsClient, window: Duration) {
    let result = tokio::time::timeout(window, ws.next()).await;
    if let Ok(Some(Ok(Message::Text(t)))) = result {
        panic!("unexpected frame: {}", t);
    }
}

// ── broadcast policy ─────────────────────────────────────────────────────────

/// The sender receives its own message back under the default policy.
#[tokio::test]
async fn test_echo_to_sender() {
    let url = spawn_relay(BroadcastPolicy::All).await;
    let mut a = connect(&url).await;

    let payload = r#"{"user":"Alice","text":"hello","timestamp":"10:00"}"#;
    a.send(Message::text(payload)).await.unwrap();

    assert_eq!(recv_text(&mut a).await, payload);
}

/// One inbound frame reaches every connected peer, sender included.
#[tokio::test]
async fn test_fan_out_reaches_all_peers() {
    let url = spawn_relay(BroadcastPolicy::All).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let mut c = connect(&url).await;

    // Let all three connection actors register
    tokio::time::sleep(Duration::from_millis(200)).await;

    a.send(Message::text("broadcast me")).await.unwrap();

    assert_eq!(recv_text(&mut a).await, "broadcast me");
    assert_eq!(recv_text(&mut b).await, "broadcast me");
    assert_eq!(recv_text(&mut c).await, "broadcast me");
}

/// With the exclude-sender policy, everyone but the sender is delivered to.
#[tokio::test]
async fn test_exclude_sender_policy() {
    let url = spawn_relay(BroadcastPolicy::ExcludeSender).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    a.send(Message::text("no echo")).await.unwrap();

    assert_eq!(recv_text(&mut b).await, "no echo");
    assert_no_text(&mut a, Duration::from_millis(300)).await;
}

// ── lifecycle ────────────────────────────────────────────────────────────────

/// A peer that connects later sees only later messages, no backlog replay.
#[tokio::test]
async fn test_late_joiner_gets_no_backlog() {
    let url = spawn_relay(BroadcastPolicy::All).await;
    let mut a = connect(&url).await;

    a.send(Message::text("first")).await.unwrap();
    // Echo received: the first broadcast has fully completed
    assert_eq!(recv_text(&mut a).await, "first");

    let mut b = connect(&url).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    a.send(Message::text("second")).await.unwrap();

    assert_eq!(recv_text(&mut a).await, "second");
    // The very first frame `b` sees is the second message
    assert_eq!(recv_text(&mut b).await, "second");
}

/// A disconnected peer does not block delivery to the others.
#[tokio::test]
async fn test_disconnect_does_not_block_delivery() {
    let url = spawn_relay(BroadcastPolicy::All).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let mut c = connect(&url).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    c.close(None).await.unwrap();
    drop(c);

    a.send(Message::text("still flowing")).await.unwrap();

    assert_eq!(recv_text(&mut a).await, "still flowing");
    assert_eq!(recv_text(&mut b).await, "still flowing");
}

// ── client supervisor against a real relay ───────────────────────────────────

/// The supervisor wraps outbound text in the chat convention and parses the
/// echo back into an event.
#[tokio::test]
async fn test_chat_client_round_trip() {
    let url = spawn_relay(BroadcastPolicy::All).await;

    // Raw observer connected before the supervisor sends
    let mut observer = connect(&url).await;

    let (event_tx, mut events) = mpsc::channel(32);
    let (out_tx, out_rx) = mpsc::channel(32);
    let client = ChatClient::new(url.clone(), "alice", ReconnectPolicy::immediate());
    tokio::spawn(client.run(event_tx, out_rx));

    let connected = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(connected, ClientEvent::Connected);
    tokio::time::sleep(Duration::from_millis(200)).await;

    out_tx.send("hello room".to_string()).await.unwrap();

    // The observer sees the convention on the wire
    let raw = recv_text(&mut observer).await;
    let wire: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(wire["user"], "alice");
    assert_eq!(wire["text"], "hello room");

    // The supervisor parses its own echo
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        ClientEvent::Message(msg) => {
            assert_eq!(msg.user, "alice");
            assert_eq!(msg.text, "hello room");
        }
        other => panic!("expected message event, got {:?}", other),
    }
}
