//! Shared fixtures for integration tests

#![allow(dead_code)]

use serde_json::Value;
use tokio::sync::mpsc;

use social_presence_relay::config::{
    ApiConfig, JwtConfig, LoggingConfig, ServerConfig, Settings, WebSocketConfig,
};
use social_presence_relay::websocket::OutboundMessage;

pub const API_KEY: &str = "test-api-key";
pub const JWT_SECRET: &str = "integration-test-secret";

pub fn test_settings(api_key: Option<&str>, require_auth: bool) -> Settings {
    Settings {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            issuer: None,
            audience: None,
        },
        api: ApiConfig {
            key: api_key.map(str::to_string),
        },
        websocket: WebSocketConfig {
            require_auth,
            ..Default::default()
        },
        logging: LoggingConfig::default(),
    }
}

/// Drain every data frame currently queued on a connection channel
pub fn drain_frames(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Some(Ok(text)) = msg.to_json() {
            frames.push(serde_json::from_str(&text).expect("frame should be valid JSON"));
        }
    }
    frames
}

/// Frames with the given event name
pub fn frames_named<'a>(frames: &'a [Value], event: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["event"] == event).collect()
}
