//! Per-connection state machine and event routing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use parley_config::RelayConfig;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::presence::{ConnectionHandle, ConnectionId, PresenceRegistry, Registration};
use crate::protocol::{ClientEvent, DeliveredMessage, SendMessage, ServerEvent, Typing};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unidentified,
    Identified(String),
    Closed,
}

/// Server side of one client connection.
///
/// Owned by the task that reads the connection's frames.
#[derive(Debug)]
pub struct RelayConnection {
    handle: ConnectionHandle,
    state: ConnectionState,
    authenticated_user: Option<String>,
}

impl RelayConnection {
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Identified(user_id) => Some(user_id),
            _ => None,
        }
    }

    pub fn is_identified(&self) -> bool {
        matches!(self.state, ConnectionState::Identified(_))
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}

/// What happened to an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Registered(Registration),
    Forwarded,
    Dropped(DropReason),
    /// Not identified yet, or already closed.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    RecipientOffline,
    /// `senderId` does not match the identified user.
    SenderMismatch,
    /// `addUser` named someone other than the authenticated user.
    IdentityMismatch,
    EmptyContent,
    EmptyIdentity,
    /// The recipient's queue was full or its connection closed mid-forward.
    Undeliverable,
}

pub struct RelayServer {
    registry: PresenceRegistry,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
    outbound_capacity: usize,
}

impl RelayServer {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            registry: PresenceRegistry::new(),
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.outbound_buffer)
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// Accept a new connection.
    ///
    /// `authenticated_user` is the identity proven at upgrade time, if any.
    /// When present, `addUser` may only name that user. The receiver yields
    /// every event addressed to this connection.
    pub async fn connect(
        &self,
        authenticated_user: Option<String>,
    ) -> (RelayConnection, mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let handle = ConnectionHandle::new(id, tx);

        self.connections.write().await.insert(id, handle.clone());
        info!(connection = %id, user = ?authenticated_user, "relay connection opened");

        let connection = RelayConnection {
            handle,
            state: ConnectionState::Unidentified,
            authenticated_user,
        };
        (connection, rx)
    }

    /// Decode and dispatch one text frame. Malformed frames are logged and dropped.
    pub async fn handle_frame(&self, connection: &mut RelayConnection, frame: &str) -> Option<Dispatch> {
        match ClientEvent::decode(frame) {
            Ok(event) => Some(self.dispatch(connection, event).await),
            Err(err) => {
                warn!(connection = %connection.id(), error = %err, "dropping malformed frame");
                None
            }
        }
    }

    pub async fn dispatch(&self, connection: &mut RelayConnection, event: ClientEvent) -> Dispatch {
        if connection.is_closed() {
            return Dispatch::Ignored;
        }

        if let ClientEvent::Identify(user_id) = &event {
            return self.identify(connection, user_id.trim()).await;
        }

        let Some(sender) = connection.user_id().map(str::to_owned) else {
            debug!(
                connection = %connection.id(),
                event = event.name(),
                "ignoring event from unidentified connection"
            );
            return Dispatch::Ignored;
        };

        match event {
            ClientEvent::Identify(_) => Dispatch::Ignored,
            ClientEvent::SendMessage(payload) => self.forward_message(&sender, payload).await,
            ClientEvent::TypingStart(payload) => {
                self.forward_typing(&sender, payload, ServerEvent::TypingStart)
                    .await
            }
            ClientEvent::TypingStop(payload) => {
                self.forward_typing(&sender, payload, ServerEvent::TypingStop)
                    .await
            }
        }
    }

    /// Close the connection and withdraw its presence. Safe to call more than once.
    pub async fn disconnect(&self, connection: &mut RelayConnection) {
        if connection.is_closed() {
            return;
        }
        connection.state = ConnectionState::Closed;

        let id = connection.id();
        self.connections.write().await.remove(&id);

        match self.registry.deregister(id).await {
            Some(user_id) => {
                info!(connection = %id, user_id, "user went offline");
                self.broadcast_presence().await;
            }
            None => debug!(connection = %id, "closed connection had no presence entry"),
        }
    }

    pub async fn online_users(&self) -> Vec<String> {
        self.registry.snapshot().await
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn identify(&self, connection: &mut RelayConnection, user_id: &str) -> Dispatch {
        if user_id.is_empty() {
            warn!(connection = %connection.id(), "addUser without a user id");
            return Dispatch::Dropped(DropReason::EmptyIdentity);
        }

        if let Some(authenticated) = connection.authenticated_user.as_deref() {
            if authenticated != user_id {
                warn!(
                    connection = %connection.id(),
                    authenticated,
                    claimed = user_id,
                    "addUser does not match authenticated user"
                );
                return Dispatch::Dropped(DropReason::IdentityMismatch);
            }
        }

        let registration = self
            .registry
            .register(user_id, connection.handle.clone())
            .await;
        connection.state = ConnectionState::Identified(user_id.to_owned());

        match registration {
            Registration::Inserted => {
                info!(connection = %connection.id(), user_id, "user came online")
            }
            Registration::Replaced { previous } => info!(
                connection = %connection.id(),
                previous = %previous,
                user_id,
                "user reconnected, replacing previous connection"
            ),
            Registration::Unchanged => {
                debug!(connection = %connection.id(), user_id, "duplicate addUser")
            }
        }

        self.broadcast_presence().await;
        Dispatch::Registered(registration)
    }

    async fn forward_message(&self, sender: &str, payload: SendMessage) -> Dispatch {
        if payload.sender_id != sender {
            warn!(sender, claimed = %payload.sender_id, "dropping sendMessage with foreign senderId");
            return Dispatch::Dropped(DropReason::SenderMismatch);
        }
        if payload.content.trim().is_empty() {
            debug!(sender, "dropping sendMessage without content");
            return Dispatch::Dropped(DropReason::EmptyContent);
        }

        let receiver = payload.receiver_id.clone();
        let event = ServerEvent::Message(DeliveredMessage {
            sender_id: payload.sender_id,
            content: payload.content,
            message_id: payload.message_id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        self.forward(sender, &receiver, event).await
    }

    async fn forward_typing(
        &self,
        sender: &str,
        payload: Typing,
        wrap: fn(Typing) -> ServerEvent,
    ) -> Dispatch {
        if payload.sender_id != sender {
            warn!(sender, claimed = %payload.sender_id, "dropping typing event with foreign senderId");
            return Dispatch::Dropped(DropReason::SenderMismatch);
        }

        let receiver = payload.receiver_id.clone();
        self.forward(sender, &receiver, wrap(payload)).await
    }

    async fn forward(&self, sender: &str, receiver: &str, event: ServerEvent) -> Dispatch {
        let Some(handle) = self.registry.lookup(receiver).await else {
            debug!(sender, receiver, "recipient offline, dropping event");
            return Dispatch::Dropped(DropReason::RecipientOffline);
        };

        match handle.deliver(event) {
            Ok(()) => {
                debug!(sender, receiver, connection = %handle.id(), "forwarded event");
                Dispatch::Forwarded
            }
            Err(err) => {
                warn!(sender, receiver, error = %err, "failed to forward event");
                Dispatch::Dropped(DropReason::Undeliverable)
            }
        }
    }

    async fn broadcast_presence(&self) {
        let event = ServerEvent::presence(self.registry.snapshot().await);
        let targets: Vec<ConnectionHandle> =
            self.connections.read().await.values().cloned().collect();

        for target in targets {
            if let Err(err) = target.deliver(event.clone()) {
                debug!(connection = %target.id(), error = %err, "skipping presence update");
            }
        }
    }
}
