use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::metrics::PresenceMetrics;
use crate::presence::{DeliveryError, PresenceRegistry};
use crate::websocket::OutboundMessage;

/// Background task for transport pings and idle-connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    registry: Arc<PresenceRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<PresenceRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats();
                }
                _ = cleanup_timer.tick() => {
                    if connection_timeout > 0 {
                        self.close_idle_connections(connection_timeout);
                    }
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a transport ping on every connection.
    /// A full buffer skips the ping; a closed one is left to its close path.
    fn send_heartbeats(&self) {
        let connections = self.registry.get_all_connections();
        if connections.is_empty() {
            return;
        }

        let start = Instant::now();
        let mut sent = 0usize;
        let mut skipped = 0usize;

        for handle in &connections {
            match handle.try_deliver(OutboundMessage::Ping) {
                Ok(()) => sent += 1,
                Err(DeliveryError::Full) => {
                    skipped += 1;
                    tracing::debug!(connection_id = %handle.id, "Outbound buffer full, ping skipped");
                }
                Err(DeliveryError::Closed) => skipped += 1,
            }
        }

        PresenceMetrics::update_from_stats(&self.registry.stats());

        tracing::debug!(
            total = connections.len(),
            sent,
            skipped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Heartbeat round completed"
        );
    }

    /// Close connections silent for longer than `timeout_secs` and drop
    /// their registrations, which updates the online list.
    fn close_idle_connections(&self, timeout_secs: u64) {
        let idle = self.registry.find_idle_connections(timeout_secs);
        if idle.is_empty() {
            return;
        }

        let closed = idle
            .into_iter()
            .filter(|id| self.registry.close_connection(*id))
            .count();

        tracing::info!(
            closed,
            timeout_secs,
            "Closed idle connections"
        );
    }
}
