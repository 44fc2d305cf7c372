//! Who is online, and through which connection.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::error::RelayError;
use crate::protocol::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sending half of a live connection.
///
/// Two handles are equal when they refer to the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Queue an event without waiting. A full queue drops the event.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), RelayError> {
        self.outbound.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RelayError::Full(self.id),
            mpsc::error::TrySendError::Closed(_) => RelayError::Closed(self.id),
        })
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub user_id: String,
    pub handle: ConnectionHandle,
    pub registered_at: DateTime<Utc>,
}

/// Outcome of [`PresenceRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    /// The user was bound to another connection, which no longer receives events.
    Replaced { previous: ConnectionId },
    /// The same user and connection were already registered.
    Unchanged,
}

/// Map of user id to that user's single live connection.
///
/// All access goes through the lock; no guard is held across an await point
/// outside this type.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: RwLock<HashMap<String, PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle`. The most recent registration wins.
    ///
    /// A connection carries at most one identity, so any other user bound to
    /// the same connection is removed first.
    pub async fn register(&self, user_id: &str, handle: ConnectionHandle) -> Registration {
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|user, entry| user == user_id || entry.handle != handle);
        if entries.len() != before {
            debug!(connection = %handle.id(), user_id, "connection changed identity");
        }

        match entries.get_mut(user_id) {
            Some(entry) if entry.handle == handle => Registration::Unchanged,
            Some(entry) => {
                let previous = entry.handle.id();
                entry.handle = handle;
                entry.registered_at = Utc::now();
                Registration::Replaced { previous }
            }
            None => {
                entries.insert(
                    user_id.to_owned(),
                    PresenceEntry {
                        user_id: user_id.to_owned(),
                        handle,
                        registered_at: Utc::now(),
                    },
                );
                Registration::Inserted
            }
        }
    }

    /// Remove whichever user is bound to `connection`.
    ///
    /// Returns that user, or `None` when the connection was never registered
    /// or has since been replaced.
    pub async fn deregister(&self, connection: ConnectionId) -> Option<String> {
        let mut entries = self.entries.write().await;
        let user_id = entries
            .values()
            .find(|entry| entry.handle.id() == connection)
            .map(|entry| entry.user_id.clone())?;
        entries.remove(&user_id);
        Some(user_id)
    }

    pub async fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.entries
            .read()
            .await
            .get(user_id)
            .map(|entry| entry.handle.clone())
    }

    pub async fn entry(&self, user_id: &str) -> Option<PresenceEntry> {
        self.entries.read().await.get(user_id).cloned()
    }

    /// Online user ids, sorted.
    pub async fn snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.entries.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
