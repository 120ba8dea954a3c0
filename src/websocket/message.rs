use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Event names the server emits to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerEvent {
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers,
    #[serde(rename = "newNotification")]
    NewNotification,
    #[serde(rename = "newPostCreated")]
    NewPostCreated,
    #[serde(rename = "postDeleted")]
    PostDeleted,
    #[serde(rename = "postLikeUpdate")]
    PostLikeUpdate,
    #[serde(rename = "postCommentUpdate")]
    PostCommentUpdate,
    #[serde(rename = "userProfileUpdate")]
    UserProfileUpdate,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error,
}

impl ServerEvent {
    pub const RELAYABLE: [ServerEvent; 6] = [
        ServerEvent::NewNotification,
        ServerEvent::NewPostCreated,
        ServerEvent::PostDeleted,
        ServerEvent::PostLikeUpdate,
        ServerEvent::PostCommentUpdate,
        ServerEvent::UserProfileUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers => "getOnlineUsers",
            ServerEvent::NewNotification => "newNotification",
            ServerEvent::NewPostCreated => "newPostCreated",
            ServerEvent::PostDeleted => "postDeleted",
            ServerEvent::PostLikeUpdate => "postLikeUpdate",
            ServerEvent::PostCommentUpdate => "postCommentUpdate",
            ServerEvent::UserProfileUpdate => "userProfileUpdate",
            ServerEvent::Pong => "pong",
            ServerEvent::Error => "error",
        }
    }

    /// Whether collaborators may emit this event through the relay API.
    /// The online-user list, pong and error frames are owned by the server.
    pub fn is_relayable(&self) -> bool {
        Self::RELAYABLE.contains(self)
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown event name: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for ServerEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "getOnlineUsers" => Ok(ServerEvent::OnlineUsers),
            "newNotification" => Ok(ServerEvent::NewNotification),
            "newPostCreated" => Ok(ServerEvent::NewPostCreated),
            "postDeleted" => Ok(ServerEvent::PostDeleted),
            "postLikeUpdate" => Ok(ServerEvent::PostLikeUpdate),
            "postCommentUpdate" => Ok(ServerEvent::PostCommentUpdate),
            "userProfileUpdate" => Ok(ServerEvent::UserProfileUpdate),
            "pong" => Ok(ServerEvent::Pong),
            "error" => Ok(ServerEvent::Error),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

/// Message sent from server to client: `{"event": "...", "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub event: ServerEvent,
    #[serde(default)]
    pub data: Value,
}

impl ServerMessage {
    pub fn new(event: ServerEvent, data: Value) -> Self {
        Self { event, data }
    }

    pub fn online_users(users: &[String]) -> Self {
        Self::new(ServerEvent::OnlineUsers, Value::from(users.to_vec()))
    }

    pub fn pong() -> Self {
        Self::new(ServerEvent::Pong, Value::Null)
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ServerEvent::Error,
            serde_json::json!({
                "code": code.into(),
                "message": message.into(),
            }),
        )
    }
}

/// Frame queued on a connection's outbound channel
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Serialized by the connection's send task
    Raw(ServerMessage),
    /// Serialized once and shared across many connections
    Preserialized(Arc<str>),
    /// Transport-level ping
    Ping,
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(message)?;
        Ok(Self::Preserialized(Arc::from(json)))
    }

    /// JSON text for data frames, `None` for control frames
    pub fn to_json(&self) -> Option<Result<String, serde_json::Error>> {
        match self {
            Self::Raw(message) => Some(serde_json::to_string(message)),
            Self::Preserialized(json) => Some(Ok(json.to_string())),
            Self::Ping => None,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `registerUser`; `None` when the payload carried no usable id
    RegisterUser { user_id: Option<String> },
    Ping,
}

#[derive(Debug, Error)]
pub enum ClientMessageError {
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}

#[derive(Deserialize)]
struct ClientEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ClientMessageError> {
        let envelope: ClientEnvelope = serde_json::from_str(text)?;

        match envelope.event.as_str() {
            "registerUser" => Ok(ClientMessage::RegisterUser {
                user_id: registration_user_id(&envelope.data),
            }),
            "ping" => Ok(ClientMessage::Ping),
            _ => Err(ClientMessageError::UnknownEvent(envelope.event)),
        }
    }
}

/// Accepts a string or numeric id, bare or as `{"userId": ...}`.
/// Anything else, and the falsy values `""` and `0`, yields no id.
fn registration_user_id(data: &Value) -> Option<String> {
    let id = match data {
        Value::Object(map) => map.get("userId")?,
        other => other,
    };

    let raw = match id {
        Value::String(id) => id.trim().to_string(),
        Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
        _ => return None,
    };

    (!raw.is_empty()).then_some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_message_wire_format() {
        let msg = ServerMessage::online_users(&["u1".to_string(), "u2".to_string()]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"event": "getOnlineUsers", "data": ["u1", "u2"]}));

        let err = serde_json::to_value(ServerMessage::error("BAD", "nope")).unwrap();
        assert_eq!(err["event"], "error");
        assert_eq!(err["data"]["code"], "BAD");
    }

    #[test]
    fn test_event_name_parsing() {
        for event in ServerEvent::RELAYABLE {
            assert_eq!(event.as_str().parse::<ServerEvent>().unwrap(), event);
            assert!(event.is_relayable());
        }
        assert!(!ServerEvent::OnlineUsers.is_relayable());
        assert!(!ServerEvent::Error.is_relayable());
        assert!("registerUser".parse::<ServerEvent>().is_err());
    }

    #[test]
    fn test_parse_register_user() {
        let msg = ClientMessage::parse(r#"{"event":"registerUser","data":"u1"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RegisterUser { user_id: Some("u1".into()) });

        let msg =
            ClientMessage::parse(r#"{"event":"registerUser","data":{"userId":"u2"}}"#).unwrap();
        assert_eq!(msg, ClientMessage::RegisterUser { user_id: Some("u2".into()) });
    }

    #[test]
    fn test_parse_register_numeric_user() {
        let msg = ClientMessage::parse(r#"{"event":"registerUser","data":42}"#).unwrap();
        assert_eq!(msg, ClientMessage::RegisterUser { user_id: Some("42".into()) });

        let msg =
            ClientMessage::parse(r#"{"event":"registerUser","data":{"userId":7}}"#).unwrap();
        assert_eq!(msg, ClientMessage::RegisterUser { user_id: Some("7".into()) });
    }

    #[test]
    fn test_parse_register_user_without_id() {
        for text in [
            r#"{"event":"registerUser"}"#,
            r#"{"event":"registerUser","data":null}"#,
            r#"{"event":"registerUser","data":""}"#,
            r#"{"event":"registerUser","data":"   "}"#,
            r#"{"event":"registerUser","data":0}"#,
            r#"{"event":"registerUser","data":true}"#,
            r#"{"event":"registerUser","data":{}}"#,
        ] {
            let msg = ClientMessage::parse(text).unwrap();
            assert_eq!(msg, ClientMessage::RegisterUser { user_id: None }, "{}", text);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ClientMessageError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"event":"subscribe","data":[]}"#),
            Err(ClientMessageError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_preserialized_matches_raw() {
        let msg = ServerMessage::new(ServerEvent::PostDeleted, json!({"postId": "p1"}));
        let raw = OutboundMessage::Raw(msg.clone()).to_json().unwrap().unwrap();
        let pre = OutboundMessage::preserialized(&msg)
            .unwrap()
            .to_json()
            .unwrap()
            .unwrap();
        assert_eq!(raw, pre);
        assert!(OutboundMessage::Ping.to_json().is_none());
    }
}
