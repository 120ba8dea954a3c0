//! Connection handle and related types

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

/// Why a frame could not be queued on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound buffer is full")]
    Full,
    #[error("connection is closed")]
    Closed,
}

impl<T> From<TrySendError<T>> for DeliveryError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        }
    }
}

/// Handle for a single live WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    /// Subject of the token presented at handshake, if any
    pub authenticated_user: Option<String>,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    /// Last activity timestamp (Unix seconds)
    last_activity: AtomicI64,
    /// User this connection is registered as; written only by the registry
    user_id: RwLock<Option<String>>,
    /// Close requests bypass the data channel so a full buffer cannot swallow them
    close_signal: Notify,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<OutboundMessage>, authenticated_user: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            authenticated_user,
            connected_at: now,
            sender,
            last_activity: AtomicI64::new(now.timestamp()),
            user_id: RwLock::new(None),
            close_signal: Notify::new(),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, at: DateTime<Utc>) {
        self.last_activity.store(at.timestamp(), Ordering::Relaxed);
    }

    /// Registered user id, `None` while the connection is unregistered
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.user_id.read().is_some()
    }

    pub(crate) fn set_user_id(&self, user_id: Option<String>) {
        *self.user_id.write() = user_id;
    }

    /// Whether this connection may register as `user_id`.
    /// Anonymous connections may claim any id.
    pub fn may_register_as(&self, user_id: &str) -> bool {
        self.authenticated_user
            .as_deref()
            .map_or(true, |subject| subject == user_id)
    }

    /// Queue a frame without waiting for buffer space
    pub fn try_deliver(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
        self.sender.try_send(message).map_err(DeliveryError::from)
    }

    /// Send a reply to this connection, waiting for buffer space
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(OutboundMessage::Raw(message)).await
    }

    /// Ask the connection's send task to close the socket
    pub fn close(&self) -> Result<(), DeliveryError> {
        if self.sender.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.close_signal.notify_one();
        Ok(())
    }

    /// Resolves once `close` has been called, including calls made before
    /// the wait started.
    pub async fn close_requested(&self) {
        self.close_signal.notified().await;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id())
            .field("authenticated_user", &self.authenticated_user)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_deliver_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx, None);

        assert!(handle.try_deliver(OutboundMessage::Ping).is_ok());
        assert_eq!(
            handle.try_deliver(OutboundMessage::Ping),
            Err(DeliveryError::Full)
        );

        drop(rx);
        assert_eq!(handle.close(), Err(DeliveryError::Closed));
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_close_request_survives_full_buffer() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx, None);
        handle.try_deliver(OutboundMessage::Ping).unwrap();
        assert_eq!(
            handle.try_deliver(OutboundMessage::Ping),
            Err(DeliveryError::Full)
        );

        assert!(handle.close().is_ok());
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.close_requested())
            .await
            .expect("close request should be observed");
    }

    #[test]
    fn test_registration_permission() {
        let (tx, _rx) = mpsc::channel(1);
        let anonymous = ConnectionHandle::new(tx.clone(), None);
        assert!(anonymous.may_register_as("anyone"));

        let authed = ConnectionHandle::new(tx, Some("u1".to_string()));
        assert!(authed.may_register_as("u1"));
        assert!(!authed.may_register_as("u2"));
    }

    #[test]
    fn test_new_handle_is_unregistered() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx, None);
        assert!(!handle.is_registered());
        assert!(handle.user_id().is_none());
        assert!(handle.last_activity() <= Utc::now());
    }
}
