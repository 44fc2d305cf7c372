//! Realtime relay for direct messages.
//!
//! Connections announce who they are with `addUser`, after which
//! `sendMessage`, `typing` and `typing stop` events are forwarded to the
//! receiver's live connection when there is one and dropped otherwise.
//! Every change to the set of online users is broadcast as `getUsers`.
//!
//! The relay never persists anything. Durable storage of messages is a
//! separate write performed by clients through the REST API.

pub mod error;
pub mod presence;
pub mod protocol;
pub mod server;

pub use error::RelayError;
pub use presence::{ConnectionHandle, ConnectionId, PresenceEntry, PresenceRegistry, Registration};
pub use protocol::{ClientEvent, DeliveredMessage, OnlineUser, SendMessage, ServerEvent, Typing};
pub use server::{ConnectionState, Dispatch, DropReason, RelayConnection, RelayServer};
