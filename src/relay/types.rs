use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Follow,
    Like,
    Comment,
}

/// The `from` side of a notification: a bare id, or the populated
/// `{_id, username, profileImg}` projection of the user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(String),
    Populated(UserSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "profileImg", default, skip_serializing_if = "Option::is_none")]
    pub profile_img: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::Populated(user) => &user.id,
        }
    }
}

/// Notification record relayed to its recipient as `newNotification`.
///
/// Field names follow the stored record so clients can treat the live event
/// and the fetched record alike. Unknown fields are passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub from: UserRef,
    pub to: String,
    #[serde(rename = "postId", default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            from: UserRef::Id(from.into()),
            to: to.into(),
            post_id: None,
            read: false,
            created_at: Some(Utc::now()),
            extra: Map::new(),
        }
    }

    pub fn with_post(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = Some(post_id.into());
        self
    }

    pub fn is_self_notification(&self) -> bool {
        self.from.id() == self.to
    }
}

/// Payload of `postDeleted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDeleted {
    #[serde(rename = "postId")]
    pub post_id: String,
}

/// Payload of `userProfileUpdate`: both sides of a follow/unfollow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub updated_user_to_modify: Value,
    pub updated_current_user: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_populated_record_round_trip() {
        let record = json!({
            "_id": "n1",
            "type": "like",
            "from": {"_id": "u2", "username": "bob", "profileImg": "https://img/b.png"},
            "to": "u1",
            "postId": "p1",
            "read": false,
            "createdAt": "2024-05-01T10:00:00Z",
            "__v": 0
        });

        let event: NotificationEvent = serde_json::from_value(record.clone()).unwrap();
        assert_eq!(event.kind, NotificationKind::Like);
        assert_eq!(event.from.id(), "u2");
        assert_eq!(event.post_id.as_deref(), Some("p1"));
        assert_eq!(event.extra.get("__v"), Some(&json!(0)));

        assert_eq!(serde_json::to_value(&event).unwrap(), record);
    }

    #[test]
    fn test_bare_record_defaults() {
        let event: NotificationEvent =
            serde_json::from_value(json!({"type": "follow", "from": "u2", "to": "u1"})).unwrap();

        assert_eq!(event.from, UserRef::Id("u2".to_string()));
        assert!(!event.read);
        assert!(event.post_id.is_none());
        assert!(event.created_at.is_none());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<NotificationEvent, _> =
            serde_json::from_value(json!({"type": "repost", "from": "u2", "to": "u1"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_and_self_notification() {
        let event = NotificationEvent::new(NotificationKind::Comment, "u1", "u2").with_post("p9");
        assert_eq!(event.post_id.as_deref(), Some("p9"));
        assert!(!event.is_self_notification());

        let own = NotificationEvent::new(NotificationKind::Like, "u1", "u1");
        assert!(own.is_self_notification());
    }

    #[test]
    fn test_profile_update_field_names() {
        let update = ProfileUpdate {
            updated_user_to_modify: json!({"_id": "u1"}),
            updated_current_user: json!({"_id": "u2"}),
        };
        let value = serde_json::to_value(update).unwrap();
        assert_eq!(value["updatedUserToModify"]["_id"], "u1");
        assert_eq!(value["updatedCurrentUser"]["_id"], "u2");
    }
}
