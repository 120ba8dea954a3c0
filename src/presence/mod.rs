//! Presence registry: which users are online and how to reach them.

mod handle;
mod registry;
mod stats;

pub use handle::{ConnectionHandle, DeliveryError};
pub use registry::PresenceRegistry;
pub use stats::{DeliveryReport, PresenceStats, RegisterOutcome, RelayOutcome};
