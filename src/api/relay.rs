//! Trigger endpoints the social backend calls after a successful write.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::relay::{DeliveryResult, NotificationEvent, ProfileUpdate};
use crate::server::AppState;
use crate::websocket::{ServerEvent, UnknownEvent};

/// Generic event request: `{"event": "<name>", "data": ...}`
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventRequest {
    fn event_name(&self) -> Result<ServerEvent> {
        self.event
            .parse()
            .map_err(|e: UnknownEvent| AppError::Validation(e.to_string()))
    }
}

/// Response for relay and broadcast operations
#[derive(Debug, Serialize)]
pub struct RelayResponse {
    /// The request was accepted; says nothing about delivery
    pub success: bool,
    #[serde(flatten)]
    pub result: DeliveryResult,
    pub timestamp: DateTime<Utc>,
}

impl From<DeliveryResult> for RelayResponse {
    fn from(result: DeliveryResult) -> Self {
        Self {
            success: true,
            result,
            timestamp: Utc::now(),
        }
    }
}

/// Relay a stored notification to its recipient
pub async fn send_notification(
    State(state): State<AppState>,
    Json(notification): Json<NotificationEvent>,
) -> Result<Json<RelayResponse>> {
    let result = state.relay.notify(notification)?;
    Ok(Json(result.into()))
}

/// Relay any known event to one user
pub async fn relay_event(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<EventRequest>,
) -> Result<Json<RelayResponse>> {
    let event = request.event_name()?;
    let result = state.relay.relay(&user_id, event, request.data)?;
    Ok(Json(result.into()))
}

/// Broadcast any known event to every connection
pub async fn broadcast_event(
    State(state): State<AppState>,
    Json(request): Json<EventRequest>,
) -> Result<Json<RelayResponse>> {
    let event = request.event_name()?;
    let result = state.relay.broadcast(event, request.data)?;
    Ok(Json(result.into()))
}

pub async fn post_created(
    State(state): State<AppState>,
    Json(post): Json<serde_json::Value>,
) -> Result<Json<RelayResponse>> {
    Ok(Json(state.relay.post_created(post).into()))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<RelayResponse>> {
    let result = state.relay.post_deleted(&post_id)?;
    Ok(Json(result.into()))
}

pub async fn post_like_update(
    State(state): State<AppState>,
    Json(post): Json<serde_json::Value>,
) -> Result<Json<RelayResponse>> {
    Ok(Json(state.relay.post_like_updated(post).into()))
}

pub async fn post_comment_update(
    State(state): State<AppState>,
    Json(post): Json<serde_json::Value>,
) -> Result<Json<RelayResponse>> {
    Ok(Json(state.relay.post_comment_updated(post).into()))
}

pub async fn user_profile_update(
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<RelayResponse>> {
    let result = state.relay.user_profile_updated(update)?;
    Ok(Json(result.into()))
}
