//! Prometheus metrics for the presence relay.
//!
//! - Connection metrics (open connections, online users, lifecycle counters)
//! - Message metrics (sent by target, delivered, failed, dropped offline)
//! - WebSocket inbound message counters

mod helpers;

pub use helpers::{encode_metrics, MessageMetrics, PresenceMetrics, WsMessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "presence";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of live WebSocket connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Number of live WebSocket connections"
    ).unwrap();

    /// Number of registered (online) users
    pub static ref USERS_ONLINE: IntGauge = register_int_gauge!(
        format!("{}_users_online", METRIC_PREFIX),
        "Number of users with a registered connection"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0, 86400.0]
    ).unwrap();

    /// Registration messages accepted
    pub static ref REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_registrations_total", METRIC_PREFIX),
        "Total user registrations accepted"
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Messages sent by target type
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total messages sent",
        &["target"]
    ).unwrap();

    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages queued on a connection"
    ).unwrap();

    pub static ref MESSAGES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Total per-connection delivery failures"
    ).unwrap();

    /// Relays skipped because the recipient had no live connection
    pub static ref RELAY_OFFLINE_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_relay_offline_dropped_total", METRIC_PREFIX),
        "Total relays dropped because the recipient was offline"
    ).unwrap();

    /// Client messages received by type
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total WebSocket messages received from clients",
        &["type"]
    ).unwrap();
}
