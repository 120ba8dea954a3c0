//! Outcome and statistics types returned by the presence registry

use serde::Serialize;
use uuid::Uuid;

use super::handle::DeliveryError;

/// Result of a `register` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Empty user id or closed connection
    Ignored,
    /// Mapping written; `replaced` is the connection that held it before
    Registered { replaced: Option<Uuid> },
    /// The connection was already registered as this user
    Unchanged,
}

impl RegisterOutcome {
    pub fn replaced(&self) -> Option<Uuid> {
        match self {
            RegisterOutcome::Registered { replaced } => *replaced,
            _ => None,
        }
    }
}

/// Result of relaying to a single user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// No connection is registered for the user
    Offline,
    Delivered { connection_id: Uuid },
    Failed { connection_id: Uuid, error: DeliveryError },
}

impl RelayOutcome {
    pub fn delivered(&self) -> usize {
        usize::from(matches!(self, RelayOutcome::Delivered { .. }))
    }

    pub fn failed(&self) -> usize {
        usize::from(matches!(self, RelayOutcome::Failed { .. }))
    }
}

/// Per-recipient counts for a multi-connection send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct PresenceStats {
    pub total_connections: usize,
    pub online_users: usize,
    pub unregistered_connections: usize,
}
