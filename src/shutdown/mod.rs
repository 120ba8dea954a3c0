//! Graceful shutdown for the presence relay.
//!
//! Stops background tasks, asks every connection to close and waits a short
//! grace period for their close paths to unregister them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::presence::PresenceRegistry;

/// Coordinates shutdown of background tasks and live connections
pub struct GracefulShutdown {
    registry: Arc<PresenceRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    grace: Duration,
}

impl GracefulShutdown {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        shutdown_tx: broadcast::Sender<()>,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            shutdown_tx,
            grace,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.registry.connection_count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown");

        // Background tasks first so the sweeper stops touching connections
        let _ = self.shutdown_tx.send(());

        result.close_requested = self.registry.close_all();
        result.connections_closed = self.wait_for_connections_to_close().await;
        result.remaining = self.registry.connection_count();
        result.duration = start.elapsed();

        tracing::info!(
            close_requested = result.close_requested,
            connections_closed = result.connections_closed,
            remaining = result.remaining,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn wait_for_connections_to_close(&self) -> usize {
        let initial = self.registry.connection_count();
        if initial == 0 {
            return 0;
        }

        let wait_future = async {
            while self.registry.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };

        if timeout(self.grace, wait_future).await.is_err() {
            tracing::warn!(
                remaining_connections = self.registry.connection_count(),
                "Some connections did not close gracefully"
            );
        }

        initial.saturating_sub(self.registry.connection_count())
    }
}

/// Result of a graceful shutdown
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Connections that accepted the close request
    pub close_requested: usize,
    /// Connections that finished their close path within the grace period
    pub connections_closed: usize,
    pub remaining: usize,
    pub duration: Duration,
}
