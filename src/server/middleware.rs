use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;

use super::AppState;

/// Header the social backend sends its shared key in
pub const API_KEY_HEADER: &str = "x-api-key";

/// Guards the trigger API with the shared `api.key`.
/// With no key configured every call is let through.
pub async fn api_key_auth(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(expected) = state.settings.api.key.as_deref() else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if key == expected => next.run(req).await,
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Trigger call with wrong API key");
            AppError::Auth("Invalid API key".to_string()).into_response()
        }
        None => {
            tracing::warn!(path = %req.uri().path(), "Trigger call without API key");
            AppError::Auth(format!("Missing {} header", API_KEY_HEADER)).into_response()
        }
    }
}
