//! Parley chat client.
//!
//! [`ChatClient`] keeps one relay connection per session, re-announcing the
//! user after every reconnect and replaying sends queued while offline. Each
//! outgoing message is both relayed and stored; the two paths fail
//! independently. [`Conversation`] merges relayed deliveries with fetched
//! history so a message is shown once.

pub mod client;
pub mod driver;
pub mod error;
pub mod models;
pub mod outbox;
pub mod presence;
pub mod reconcile;
pub mod rest;
pub mod typing;

pub use client::{ChatClient, ClientNotice};
pub use driver::{ConnectionStatus, DriverOptions, Emitted, RelayDriver, RelayHandle};
pub use error::{ClientError, ClientResult};
pub use models::{Chat, Message, Session, UserProfile};
pub use outbox::Outbox;
pub use presence::OnlineUsers;
pub use reconcile::{Conversation, ConversationEntry, Origin};
pub use rest::RestClient;
pub use typing::{TypingDebouncer, TypingIndicator, TypingSignal};

pub use parley_relay::{DeliveredMessage, ServerEvent};
