use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::presence::{lookup_user, online_users};
use super::relay::{
    broadcast_event, delete_post, post_comment_update, post_created, post_like_update,
    relay_event, send_notification, user_profile_update,
};

/// Unauthenticated health, stats and metrics endpoints
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
}

/// Trigger and presence endpoints, mounted under `/api/v1`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Point-to-point
        .route("/notifications", post(send_notification))
        .route("/events/users/{user_id}", post(relay_event))
        // Broadcast
        .route("/events/broadcast", post(broadcast_event))
        .route("/posts", post(post_created))
        .route("/posts/{post_id}", delete(delete_post))
        .route("/posts/likes", post(post_like_update))
        .route("/posts/comments", post(post_comment_update))
        .route("/users/profile", post(user_profile_update))
        // Presence
        .route("/presence/online", get(online_users))
        .route("/presence/users/{user_id}", get(lookup_user))
}
