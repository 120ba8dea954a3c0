use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::metrics::PresenceMetrics;
use crate::websocket::{OutboundMessage, ServerMessage};

use super::handle::{ConnectionHandle, DeliveryError};
use super::stats::{DeliveryReport, PresenceStats, RegisterOutcome, RelayOutcome};

/// Tracks live connections and which user each one is registered as.
///
/// At most one connection is mapped per user id. A later registration for
/// the same user replaces the earlier mapping (last write wins); the
/// replaced connection stays open but is no longer addressable by user id.
///
/// Every membership change and the online-user snapshot it triggers are
/// queued while `users` is held, so each connection observes snapshots in
/// the order the changes happened. Delivery never awaits: frames are put on
/// bounded per-connection channels with `try_send`, and a full or closed
/// channel only fails that one recipient.
pub struct PresenceRegistry {
    /// connection_id -> handle, registered or not
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// user_id -> handle
    users: Mutex<HashMap<String, Arc<ConnectionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Record a new transport connection in the unregistered state and
    /// queue the current online-user list to it.
    pub fn connect(
        &self,
        sender: mpsc::Sender<OutboundMessage>,
        authenticated_user: Option<String>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(sender, authenticated_user));

        let users = self.users.lock();
        self.connections.insert(handle.id, handle.clone());
        let snapshot = ServerMessage::online_users(&sorted_user_ids(&users));
        if let Err(e) = handle.try_deliver(OutboundMessage::Raw(snapshot)) {
            tracing::debug!(connection_id = %handle.id, error = %e, "Initial online list not queued");
        }
        drop(users);

        tracing::info!(connection_id = %handle.id, "Connection opened");
        handle
    }

    /// Register `handle` as `user_id`.
    ///
    /// An empty id, or a handle that is already closed, is ignored. When the
    /// same connection was registered as another user before, that mapping
    /// is dropped so a connection never answers for two users.
    pub fn register(&self, handle: &Arc<ConnectionHandle>, user_id: &str) -> RegisterOutcome {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return RegisterOutcome::Ignored;
        }

        let mut users = self.users.lock();

        if !self.connections.contains_key(&handle.id) {
            tracing::debug!(connection_id = %handle.id, "Registration on closed connection ignored");
            return RegisterOutcome::Ignored;
        }

        if let Some(previous) = handle.user_id() {
            if previous != user_id && maps_to(&users, &previous, handle.id) {
                users.remove(&previous);
            }
        }

        let replaced = users.insert(user_id.to_string(), handle.clone());
        handle.set_user_id(Some(user_id.to_string()));

        let outcome = match replaced {
            Some(old) if old.id == handle.id => RegisterOutcome::Unchanged,
            Some(old) => {
                old.set_user_id(None);
                RegisterOutcome::Registered {
                    replaced: Some(old.id),
                }
            }
            None => RegisterOutcome::Registered { replaced: None },
        };

        let report = self.broadcast_online_users(&users);
        drop(users);

        PresenceMetrics::record_registration();
        tracing::info!(
            connection_id = %handle.id,
            user_id = %user_id,
            replaced = ?outcome.replaced(),
            notified = report.delivered,
            "User registered"
        );

        outcome
    }

    /// Forget a closed connection.
    ///
    /// Returns the user id whose mapping pointed at this connection. When the
    /// mapping was already superseded by a newer registration, nothing
    /// besides the connection itself is removed.
    pub fn unregister(&self, connection_id: Uuid) -> Option<String> {
        let mut users = self.users.lock();

        let (_, handle) = self.connections.remove(&connection_id)?;
        let user_id = handle.user_id()?;

        if !maps_to(&users, &user_id, connection_id) {
            tracing::debug!(
                connection_id = %connection_id,
                user_id = %user_id,
                "Closed connection was superseded, mapping kept"
            );
            return None;
        }

        users.remove(&user_id);
        handle.set_user_id(None);
        let report = self.broadcast_online_users(&users);
        drop(users);

        tracing::info!(
            connection_id = %connection_id,
            user_id = %user_id,
            notified = report.delivered,
            "User unregistered"
        );

        Some(user_id)
    }

    /// Current connection for `user_id`, if the user is online
    pub fn lookup(&self, user_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.users.lock().get(user_id).cloned()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.lock().contains_key(user_id)
    }

    /// Deliver `message` to the connection registered as `user_id`.
    /// Offline users are skipped without error.
    pub fn relay_to_user(&self, user_id: &str, message: &ServerMessage) -> RelayOutcome {
        let Some(handle) = self.lookup(user_id) else {
            tracing::debug!(user_id = %user_id, event = %message.event, "Relay target offline");
            return RelayOutcome::Offline;
        };

        match handle.try_deliver(OutboundMessage::Raw(message.clone())) {
            Ok(()) => RelayOutcome::Delivered {
                connection_id: handle.id,
            },
            Err(error) => {
                tracing::debug!(
                    connection_id = %handle.id,
                    user_id = %user_id,
                    error = %error,
                    "Relay delivery failed"
                );
                RelayOutcome::Failed {
                    connection_id: handle.id,
                    error,
                }
            }
        }
    }

    /// Deliver `message` to every live connection, registered or not
    pub fn broadcast_all(&self, message: &ServerMessage) -> DeliveryReport {
        let handles: Vec<Arc<ConnectionHandle>> = self.get_all_connections();
        deliver_to(&handles, message)
    }

    /// Sorted, de-duplicated ids of registered users
    pub fn online_users(&self) -> Vec<String> {
        sorted_user_ids(&self.users.lock())
    }

    /// Must be called with `users` locked so snapshots stay ordered.
    fn broadcast_online_users(
        &self,
        users: &HashMap<String, Arc<ConnectionHandle>>,
    ) -> DeliveryReport {
        let snapshot = ServerMessage::online_users(&sorted_user_ids(users));
        let handles: Vec<Arc<ConnectionHandle>> = self.get_all_connections();
        deliver_to(&handles, &snapshot)
    }

    pub fn get_connection(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    pub fn get_all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Close a connection and drop its registration right away.
    ///
    /// The registration is not left to the socket's own close path, which
    /// may be stuck writing to a peer that stopped reading.
    pub fn close_connection(&self, connection_id: Uuid) -> bool {
        let Some(handle) = self.get_connection(connection_id) else {
            return false;
        };

        if let Err(e) = handle.close() {
            tracing::debug!(connection_id = %connection_id, error = %e, "Close request not signalled");
        }
        self.unregister(connection_id);
        true
    }

    /// Ask every connection to close, returning how many accepted the request
    pub fn close_all(&self) -> usize {
        self.get_all_connections()
            .iter()
            .filter(|handle| handle.close().is_ok())
            .count()
    }

    /// Connections with no inbound activity for longer than `timeout_secs`.
    /// A timeout too large to represent never expires anything.
    pub fn find_idle_connections(&self, timeout_secs: u64) -> Vec<Uuid> {
        let Some(timeout) = i64::try_from(timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
        else {
            return Vec::new();
        };
        let now = Utc::now();

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn stats(&self) -> PresenceStats {
        let online_users = self.users.lock().len();
        let total_connections = self.connections.len();

        PresenceStats {
            total_connections,
            online_users,
            unregistered_connections: total_connections.saturating_sub(online_users),
        }
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn maps_to(users: &HashMap<String, Arc<ConnectionHandle>>, user_id: &str, id: Uuid) -> bool {
    users.get(user_id).is_some_and(|h| h.id == id)
}

fn sorted_user_ids(users: &HashMap<String, Arc<ConnectionHandle>>) -> Vec<String> {
    let mut ids: Vec<String> = users.keys().cloned().collect();
    ids.sort_unstable();
    ids
}

/// Queue one message on many connections, serializing it once.
fn deliver_to(handles: &[Arc<ConnectionHandle>], message: &ServerMessage) -> DeliveryReport {
    if handles.is_empty() {
        return DeliveryReport::default();
    }

    let outbound = match OutboundMessage::preserialized(message) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::error!(error = %e, "Failed to pre-serialize message, falling back to per-connection serialization");
            OutboundMessage::Raw(message.clone())
        }
    };

    let mut report = DeliveryReport::default();
    for handle in handles {
        match handle.try_deliver(outbound.clone()) {
            Ok(()) => report.delivered += 1,
            Err(error) => {
                report.failed += 1;
                if error == DeliveryError::Full {
                    tracing::debug!(connection_id = %handle.id, event = %message.event, "Outbound buffer full, frame dropped");
                }
            }
        }
    }
    report
}
