//! Read-only presence queries.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    pub users: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct UserPresenceResponse {
    pub user_id: String,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

/// GET /api/v1/presence/online
pub async fn online_users(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    let users = state.registry.online_users();
    Json(OnlineUsersResponse {
        count: users.len(),
        users,
    })
}

/// GET /api/v1/presence/users/{user_id}
pub async fn lookup_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UserPresenceResponse> {
    let handle = state.registry.lookup(&user_id);
    Json(UserPresenceResponse {
        online: handle.is_some(),
        connection_id: handle.as_ref().map(|h| h.id),
        connected_at: handle.as_ref().map(|h| h.connected_at),
        user_id,
    })
}
