//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod presence;
mod relay;
mod routes;

pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use presence::{lookup_user, online_users};
pub use relay::{
    broadcast_event, delete_post, relay_event, send_notification, post_comment_update,
    post_created, post_like_update, user_profile_update, EventRequest, RelayResponse,
};
pub use routes::{api_routes, public_routes};
