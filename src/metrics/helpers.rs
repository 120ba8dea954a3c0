//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_TOTAL, MESSAGES_DELIVERED_TOTAL, MESSAGES_FAILED_TOTAL, MESSAGES_SENT_TOTAL,
    REGISTRATIONS_TOTAL, RELAY_OFFLINE_DROPPED_TOTAL, USERS_ONLINE, WS_CONNECTIONS_CLOSED,
    WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION, WS_MESSAGES_RECEIVED,
};
use crate::presence::PresenceStats;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording message metrics
pub struct MessageMetrics;

impl MessageMetrics {
    /// Record a relay to a single user
    pub fn record_user_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["user"]).inc();
    }

    /// Record a broadcast message
    pub fn record_broadcast_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["broadcast"]).inc();
    }

    /// Record successful deliveries
    pub fn record_delivered(count: u64) {
        MESSAGES_DELIVERED_TOTAL.inc_by(count);
    }

    /// Record failed deliveries
    pub fn record_failed(count: u64) {
        MESSAGES_FAILED_TOTAL.inc_by(count);
    }

    pub fn record_offline_dropped() {
        RELAY_OFFLINE_DROPPED_TOTAL.inc();
    }
}

/// Helper struct for connection lifecycle metrics
pub struct PresenceMetrics;

impl PresenceMetrics {
    pub fn record_connection_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_connection_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn record_registration() {
        REGISTRATIONS_TOTAL.inc();
    }

    /// Refresh gauges from a registry snapshot
    pub fn update_from_stats(stats: &PresenceStats) {
        CONNECTIONS_TOTAL.set(stats.total_connections as i64);
        USERS_ONLINE.set(stats.online_users as i64);
    }
}

/// Helper struct for WebSocket message metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_register() {
        WS_MESSAGES_RECEIVED.with_label_values(&["register"]).inc();
    }

    pub fn record_ping() {
        WS_MESSAGES_RECEIVED.with_label_values(&["ping"]).inc();
    }

    pub fn record_invalid() {
        WS_MESSAGES_RECEIVED.with_label_values(&["invalid"]).inc();
    }
}
