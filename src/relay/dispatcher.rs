use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::metrics::MessageMetrics;
use crate::presence::{PresenceRegistry, RelayOutcome};
use crate::websocket::{ServerEvent, ServerMessage};

use super::{NotificationEvent, PostDeleted, ProfileUpdate};

/// Result of a relay or broadcast call
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    /// Event name that was emitted
    pub event: ServerEvent,
    /// Number of connections the message was queued on
    pub delivered_to: usize,
    /// Number of connections that could not take the message
    pub failed: usize,
    /// Whether the target user had a live connection (point-to-point only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_online: Option<bool>,
}

impl DeliveryResult {
    fn relayed(event: ServerEvent, outcome: RelayOutcome) -> Self {
        Self {
            event,
            delivered_to: outcome.delivered(),
            failed: outcome.failed(),
            recipient_online: Some(!matches!(outcome, RelayOutcome::Offline)),
        }
    }

    fn broadcast(event: ServerEvent, delivered: usize, failed: usize) -> Self {
        Self {
            event,
            delivered_to: delivered,
            failed,
            recipient_online: None,
        }
    }
}

/// Statistics for the event relay
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Point-to-point relays attempted
    pub relays: AtomicU64,
    /// Relays dropped because the recipient was offline
    pub dropped_offline: AtomicU64,
    /// Broadcasts sent
    pub broadcasts: AtomicU64,
    /// Successful per-connection deliveries
    pub total_delivered: AtomicU64,
    /// Failed per-connection deliveries
    pub total_failed: AtomicU64,
}

impl RelayStats {
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            relays: self.relays.load(Ordering::Relaxed),
            dropped_offline: self.dropped_offline.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of relay statistics
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatsSnapshot {
    pub relays: u64,
    pub dropped_offline: u64,
    pub broadcasts: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
}

/// Emits social events to connected clients after the backend has
/// persisted them. Delivery is at most once: an offline recipient misses
/// the live event and picks up the stored record on its next fetch.
pub struct EventRelay {
    registry: Arc<PresenceRegistry>,
    stats: RelayStats,
}

impl EventRelay {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self {
            registry,
            stats: RelayStats::default(),
        }
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Relay a stored notification to its recipient, if online
    #[tracing::instrument(
        name = "relay.notify",
        skip(self, notification),
        fields(kind = ?notification.kind, to = %notification.to)
    )]
    pub fn notify(&self, notification: NotificationEvent) -> Result<DeliveryResult> {
        if notification.to.trim().is_empty() {
            return Err(AppError::Validation("Notification recipient is required".to_string()));
        }
        if notification.from.id().trim().is_empty() {
            return Err(AppError::Validation("Notification sender is required".to_string()));
        }
        if notification.is_self_notification() {
            return Err(AppError::Validation(
                "Users are not notified about their own actions".to_string(),
            ));
        }

        let recipient = notification.to.clone();
        let data = to_payload(&notification)?;
        Ok(self.send_to_user(&recipient, ServerMessage::new(ServerEvent::NewNotification, data)))
    }

    pub fn post_created(&self, post: Value) -> DeliveryResult {
        self.send_to_all(ServerMessage::new(ServerEvent::NewPostCreated, post))
    }

    pub fn post_deleted(&self, post_id: &str) -> Result<DeliveryResult> {
        if post_id.trim().is_empty() {
            return Err(AppError::Validation("Post id is required".to_string()));
        }
        let data = to_payload(&PostDeleted {
            post_id: post_id.to_string(),
        })?;
        Ok(self.send_to_all(ServerMessage::new(ServerEvent::PostDeleted, data)))
    }

    pub fn post_like_updated(&self, post: Value) -> DeliveryResult {
        self.send_to_all(ServerMessage::new(ServerEvent::PostLikeUpdate, post))
    }

    pub fn post_comment_updated(&self, post: Value) -> DeliveryResult {
        self.send_to_all(ServerMessage::new(ServerEvent::PostCommentUpdate, post))
    }

    pub fn user_profile_updated(&self, update: ProfileUpdate) -> Result<DeliveryResult> {
        let data = to_payload(&update)?;
        Ok(self.send_to_all(ServerMessage::new(ServerEvent::UserProfileUpdate, data)))
    }

    /// Relay an arbitrary known event to one user
    pub fn relay(&self, user_id: &str, event: ServerEvent, data: Value) -> Result<DeliveryResult> {
        ensure_relayable(event)?;
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("User id is required".to_string()));
        }
        Ok(self.send_to_user(user_id, ServerMessage::new(event, data)))
    }

    /// Broadcast an arbitrary known event to every connection
    pub fn broadcast(&self, event: ServerEvent, data: Value) -> Result<DeliveryResult> {
        ensure_relayable(event)?;
        Ok(self.send_to_all(ServerMessage::new(event, data)))
    }

    fn send_to_user(&self, user_id: &str, message: ServerMessage) -> DeliveryResult {
        let outcome = self.registry.relay_to_user(user_id, &message);

        self.stats.relays.fetch_add(1, Ordering::Relaxed);
        MessageMetrics::record_user_sent();
        match outcome {
            RelayOutcome::Offline => {
                self.stats.dropped_offline.fetch_add(1, Ordering::Relaxed);
                MessageMetrics::record_offline_dropped();
            }
            RelayOutcome::Delivered { .. } => {
                self.stats.total_delivered.fetch_add(1, Ordering::Relaxed);
                MessageMetrics::record_delivered(1);
            }
            RelayOutcome::Failed { .. } => {
                self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
                MessageMetrics::record_failed(1);
            }
        }

        tracing::debug!(
            user_id = %user_id,
            event = %message.event,
            outcome = ?outcome,
            "Relayed event to user"
        );

        DeliveryResult::relayed(message.event, outcome)
    }

    #[tracing::instrument(
        name = "relay.broadcast",
        skip(self, message),
        fields(event = %message.event)
    )]
    fn send_to_all(&self, message: ServerMessage) -> DeliveryResult {
        let report = self.registry.broadcast_all(&message);

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        MessageMetrics::record_broadcast_sent();
        MessageMetrics::record_delivered(report.delivered as u64);
        MessageMetrics::record_failed(report.failed as u64);

        tracing::debug!(
            event = %message.event,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast event to all connections"
        );

        DeliveryResult::broadcast(message.event, report.delivered, report.failed)
    }
}

fn ensure_relayable(event: ServerEvent) -> Result<()> {
    if event.is_relayable() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Event '{}' is reserved for the server",
            event
        )))
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(format!("Failed to encode payload: {}", e)))
}
