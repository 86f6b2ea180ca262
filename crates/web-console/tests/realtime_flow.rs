//! Drives the realtime surface over real websockets: two operators, one
//! browser call, signaling relay and disconnect cleanup.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use webcall_web_console::{AppState, ConsoleConfig, ConsoleServer};

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start_server() -> (std::net::SocketAddr, Arc<AppState>) {
    let server = ConsoleServer::with_defaults(
        ConsoleConfig::default()
            .with_jwt_secret("integration-secret")
            .without_pbx(),
    );
    let state = server.state();
    let router = server.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

/// Log a user in out-of-band and give their session an extension.
async fn seed_operator(state: &Arc<AppState>, username: &str, extension: &str) -> String {
    let (token, session_id) = state.auth.issue(username).unwrap();
    let session = state
        .registry
        .get_or_create(&session_id, username)
        .await
        .unwrap();
    session.gate().await.selected_extension = Some(extension.to_string());
    state.registry.index_extension(&session_id, extension);
    token
}

async fn connect(addr: std::net::SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{}/ws?access_token={}", addr, token);
    let (ws, _) = connect_async(url).await.expect("websocket connect");
    ws
}

async fn next_frame(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("frame error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("frame is JSON");
        }
    }
}

/// Read frames until one satisfies the predicate, failing after a bound.
async fn frame_matching(
    ws: &mut WsClient,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..20 {
        let frame = next_frame(ws).await;
        if predicate(&frame) {
            return frame;
        }
    }
    panic!("expected frame never arrived");
}

fn rpc(id: u64, method: &str, params: serde_json::Value) -> Message {
    Message::Text(
        serde_json::json!({"id": id, "method": method, "params": params}).to_string(),
    )
}

#[tokio::test]
async fn two_tabs_call_each_other_and_survive_teardown() {
    let (addr, state) = start_server().await;
    let token_a = seed_operator(&state, "alice", "100").await;
    let token_b = seed_operator(&state, "bob", "101").await;

    let mut alice = connect(addr, &token_a).await;

    // A fresh connection is seeded with its own state first.
    let first = next_frame(&mut alice).await;
    assert_eq!(first["type"], "sessionSnapshot");
    assert_eq!(first["payload"]["selectedExtension"], "100");
    let second = next_frame(&mut alice).await;
    assert_eq!(second["type"], "browserCallsSnapshot");
    assert_eq!(second["payload"].as_array().unwrap().len(), 0);

    let mut bob = connect(addr, &token_b).await;
    let _ = next_frame(&mut bob).await;
    let _ = next_frame(&mut bob).await;

    // Bob joining must not disturb Alice's connection.
    let quiet = tokio::time::timeout(Duration::from_millis(200), alice.next()).await;
    assert!(quiet.is_err(), "alice received an unexpected frame");

    // Alice places the call.
    alice
        .send(rpc(1, "placeCall", serde_json::json!({"destinationExtension": "101"})))
        .await
        .unwrap();
    let response = frame_matching(&mut alice, |f| f["id"] == 1).await;
    assert_eq!(response["success"], true);
    let caller_leg_id = response["result"]["id"].as_str().unwrap().to_string();

    // Bob's tab rings.
    let ringing = frame_matching(&mut bob, |f| f["type"] == "browserCallUpdated").await;
    assert_eq!(ringing["payload"]["incoming"], true);
    assert_eq!(ringing["payload"]["status"], "Ringing");
    assert_eq!(ringing["payload"]["remoteExtension"], "100");
    let callee_leg_id = ringing["payload"]["id"].as_str().unwrap().to_string();

    // Alice's offer relays to Bob verbatim.
    alice
        .send(rpc(
            2,
            "sendSignal",
            serde_json::json!({
                "callId": caller_leg_id,
                "type": "offer",
                "sdp": "v=0\r\n",
                "fromExtension": "100",
                "toExtension": "101",
                "sentAtUtc": "2026-08-06T12:00:00Z"
            }),
        ))
        .await
        .unwrap();
    let signal = frame_matching(&mut bob, |f| f["type"] == "webRtcSignal").await;
    assert_eq!(signal["payload"]["callId"], caller_leg_id.as_str());
    assert_eq!(signal["payload"]["type"], "offer");

    // Bob answers and reports his transport up; Alice reports hers.
    bob.send(rpc(3, "answerCall", serde_json::json!({"callId": callee_leg_id})))
        .await
        .unwrap();
    let connecting = frame_matching(&mut bob, |f| f["type"] == "browserCallUpdated").await;
    assert_eq!(connecting["payload"]["status"], "Connecting");

    bob.send(rpc(4, "markConnected", serde_json::json!({"callId": callee_leg_id})))
        .await
        .unwrap();
    let connected = frame_matching(&mut bob, |f| f["type"] == "browserCallUpdated").await;
    assert_eq!(connected["payload"]["status"], "Connected");

    alice
        .send(rpc(5, "markConnected", serde_json::json!({"callId": caller_leg_id})))
        .await
        .unwrap();
    let connected = frame_matching(&mut alice, |f| f["type"] == "browserCallUpdated").await;
    assert_eq!(connected["payload"]["status"], "Connected");

    // Bob's tab goes away: his side had the only connection, so the call
    // is forced down and Alice is told.
    bob.close(None).await.unwrap();
    let ended = frame_matching(&mut alice, |f| {
        f["type"] == "browserCallUpdated" && f["payload"]["status"] == "Ended"
    })
    .await;
    assert_eq!(ended["payload"]["endReason"], "session-disconnected");
}

#[tokio::test]
async fn unauthenticated_connect_is_refused() {
    let (addr, _state) = start_server().await;
    let url = format!("ws://{}/ws?access_token=not-a-token", addr);
    assert!(connect_async(url).await.is_err());

    let url = format!("ws://{}/ws", addr);
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn faults_are_answers_not_disconnects() {
    let (addr, state) = start_server().await;
    let token = seed_operator(&state, "alice", "100").await;
    let mut alice = connect(addr, &token).await;
    let _ = next_frame(&mut alice).await;
    let _ = next_frame(&mut alice).await;

    alice
        .send(rpc(1, "endCall", serde_json::json!({"callId": "ghost"})))
        .await
        .unwrap();
    let response = frame_matching(&mut alice, |f| f["id"] == 1).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error"]["errorCode"], "NOT_FOUND");

    // The connection is still serviceable afterwards.
    alice
        .send(rpc(2, "placeCall", serde_json::json!({"destinationExtension": "200"})))
        .await
        .unwrap();
    let response = frame_matching(&mut alice, |f| f["id"] == 2).await;
    assert_eq!(response["success"], true);
}
