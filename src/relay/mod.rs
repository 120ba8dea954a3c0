//! Social events relayed to connected clients.

mod dispatcher;
mod types;

pub use dispatcher::{DeliveryResult, EventRelay, RelayStatsSnapshot};
pub use types::{
    NotificationEvent, NotificationKind, PostDeleted, ProfileUpdate, UserRef, UserSummary,
};
