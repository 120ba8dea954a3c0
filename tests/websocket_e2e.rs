//! End-to-end tests over a real WebSocket connection

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use social_presence_relay::config::Settings;
use social_presence_relay::server::{create_app, AppState};

use common::{test_settings, JWT_SECRET};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(settings: Settings) -> (String, AppState) {
    let state = AppState::new(settings);
    let app = create_app(state.clone());
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("ws://{}/ws", addr), state)
}

fn token_for(user_id: &str) -> String {
    let claims = json!({
        "userId": user_id,
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn send_event(ws: &mut Client, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data}).to_string();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

/// Read frames until one with the given event name arrives
async fn next_event(ws: &mut Client, event: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(text.as_str()).unwrap();
                    if value["event"] == event {
                        return value;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended while waiting for {}: {:?}", event, other),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", event))
}

/// Wait until the registry reflects the expected online list
async fn wait_for_online(state: &AppState, expected: &[&str]) {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if state.registry.online_users() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("online list did not converge");
}

#[tokio::test]
async fn test_register_broadcasts_online_list() {
    let (url, state) = start_server(test_settings(None, false)).await;

    let (mut alice, _) = connect_async(url.as_str()).await.unwrap();
    let initial = next_event(&mut alice, "getOnlineUsers").await;
    assert_eq!(initial["data"], json!([]));

    send_event(&mut alice, "registerUser", json!("alice")).await;
    let online = next_event(&mut alice, "getOnlineUsers").await;
    assert_eq!(online["data"], json!(["alice"]));

    let (mut bob, _) = connect_async(url.as_str()).await.unwrap();
    let initial = next_event(&mut bob, "getOnlineUsers").await;
    assert_eq!(initial["data"], json!(["alice"]));

    send_event(&mut bob, "registerUser", json!({"userId": "bob"})).await;
    let online = next_event(&mut alice, "getOnlineUsers").await;
    assert_eq!(online["data"], json!(["alice", "bob"]));

    bob.close(None).await.unwrap();
    let online = next_event(&mut alice, "getOnlineUsers").await;
    assert_eq!(online["data"], json!(["alice"]));
    wait_for_online(&state, &["alice"]).await;
}

#[tokio::test]
async fn test_relay_reaches_socket() {
    let (url, state) = start_server(test_settings(None, false)).await;

    let (mut alice, _) = connect_async(url.as_str()).await.unwrap();
    send_event(&mut alice, "registerUser", json!("alice")).await;
    wait_for_online(&state, &["alice"]).await;

    let notification = serde_json::from_value(json!({
        "type": "follow",
        "from": "bob",
        "to": "alice"
    }))
    .unwrap();
    let result = state.relay.notify(notification).unwrap();
    assert_eq!(result.delivered_to, 1);

    let frame = next_event(&mut alice, "newNotification").await;
    assert_eq!(frame["data"]["type"], "follow");
    assert_eq!(frame["data"]["from"], "bob");
}

#[tokio::test]
async fn test_ping_and_invalid_message() {
    let (url, _state) = start_server(test_settings(None, false)).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    send_event(&mut ws, "ping", Value::Null).await;
    next_event(&mut ws, "pong").await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let error = next_event(&mut ws, "error").await;
    assert_eq!(error["data"]["code"], "INVALID_MESSAGE");

    // Connection survives a bad frame
    send_event(&mut ws, "ping", Value::Null).await;
    next_event(&mut ws, "pong").await;
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let (url, _state) = start_server(test_settings(None, false)).await;

    let result = connect_async(format!("{}?token=garbage", url)).await;
    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP 401, got {:?}", other.map(|(_, r)| r.status())),
    }
}

#[tokio::test]
async fn test_missing_token_rejected_when_required() {
    let (url, _state) = start_server(test_settings(None, true)).await;

    let result = connect_async(url.as_str()).await;
    assert!(matches!(
        result,
        Err(tokio_tungstenite::tungstenite::Error::Http(ref response)) if response.status() == 401
    ));

    let (mut ws, _) = connect_async(format!("{}?token={}", url, token_for("alice")))
        .await
        .unwrap();
    next_event(&mut ws, "getOnlineUsers").await;
}

#[tokio::test]
async fn test_authenticated_connection_cannot_impersonate() {
    let (url, state) = start_server(test_settings(None, false)).await;

    let (mut ws, _) = connect_async(format!("{}?token={}", url, token_for("alice")))
        .await
        .unwrap();

    send_event(&mut ws, "registerUser", json!("mallory")).await;
    let error = next_event(&mut ws, "error").await;
    assert_eq!(error["data"]["code"], "FORBIDDEN_REGISTRATION");
    assert!(!state.registry.is_online("mallory"));

    send_event(&mut ws, "registerUser", json!("alice")).await;
    wait_for_online(&state, &["alice"]).await;
}
