//! Merging the persisted log with relayed deliveries.
//!
//! A message can reach the client twice: once over the relay and again in a
//! later fetch of the chat history. Two copies are the same message when
//!
//! 1. both carry a stored id and the ids match, else
//! 2. both carry a client message id and those match (a relayed `messageId`
//!    naming a stored id also counts), else
//! 3. sender and content match and the timestamps are within [`DEDUP_WINDOW_MS`].

use chrono::{DateTime, Utc};
use parley_relay::DeliveredMessage;
use tracing::warn;

use crate::models::Message;

pub const DEDUP_WINDOW_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Confirmed by the message store.
    Stored,
    /// Seen only on the relay so far.
    Relayed,
    /// Sent by this client, not yet confirmed.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub id: Option<String>,
    pub client_message_id: Option<String>,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub origin: Origin,
}

impl ConversationEntry {
    pub fn stored(message: &Message) -> Self {
        Self {
            id: Some(message.id.clone()),
            client_message_id: message.client_message_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            created_at: parse_timestamp(&message.created_at),
            origin: Origin::Stored,
        }
    }

    pub fn relayed(message: &DeliveredMessage) -> Self {
        Self {
            id: None,
            client_message_id: message.message_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            created_at: parse_timestamp(&message.timestamp),
            origin: Origin::Relayed,
        }
    }

    pub fn pending(
        sender_id: impl Into<String>,
        content: impl Into<String>,
        client_message_id: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            client_message_id: Some(client_message_id.into()),
            sender_id: sender_id.into(),
            content: content.into(),
            created_at: Utc::now(),
            origin: Origin::Pending,
        }
    }

    pub fn is_same_message(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.id, &other.id) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.client_message_id, &other.client_message_id) {
            if a == b {
                return true;
            }
            // A relayed copy may carry the stored id in place of a client id.
            if self.id.as_ref() != Some(b) && other.id.as_ref() != Some(a) {
                return false;
            }
            return true;
        }
        if cross_matches(self, other) || cross_matches(other, self) {
            return true;
        }

        self.sender_id == other.sender_id
            && self.content == other.content
            && (self.created_at - other.created_at).num_milliseconds().abs() <= DEDUP_WINDOW_MS
    }

    /// Fold a second copy of this message into the entry. The stored copy wins.
    fn absorb(&mut self, other: ConversationEntry) {
        if other.origin == Origin::Stored {
            self.id = other.id;
            self.created_at = other.created_at;
            self.content = other.content;
            self.origin = Origin::Stored;
        }
        if self.client_message_id.is_none() {
            self.client_message_id = other.client_message_id;
        }
    }
}

fn cross_matches(stored: &ConversationEntry, relayed: &ConversationEntry) -> bool {
    match (&stored.id, &relayed.client_message_id) {
        (Some(id), Some(client_id)) => id == client_id,
        _ => false,
    }
}

/// Falls back to the local clock when `raw` is not RFC 3339.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(time) => time.with_timezone(&Utc),
        Err(err) => {
            warn!(raw, error = %err, "unparseable message timestamp, using local time");
            Utc::now()
        }
    }
}

/// One chat as the user sees it, ordered by creation time.
#[derive(Debug, Clone)]
pub struct Conversation {
    chat_id: String,
    entries: Vec<ConversationEntry>,
}

impl Conversation {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge a history fetch. Messages from other chats are ignored.
    /// Returns how many messages were new.
    pub fn merge_stored<'a>(&mut self, messages: impl IntoIterator<Item = &'a Message>) -> usize {
        let mut added = 0;
        for message in messages {
            if message.chat_id == self.chat_id && self.upsert(ConversationEntry::stored(message)) {
                added += 1;
            }
        }
        added
    }

    /// Apply a relayed delivery. Returns `false` if it was already shown.
    pub fn apply_relayed(&mut self, message: &DeliveredMessage) -> bool {
        self.upsert(ConversationEntry::relayed(message))
    }

    /// Show a message this client just sent, ahead of its confirmation.
    pub fn push_pending(&mut self, entry: ConversationEntry) -> bool {
        self.upsert(entry)
    }

    fn upsert(&mut self, entry: ConversationEntry) -> bool {
        let inserted = match self.entries.iter_mut().find(|e| e.is_same_message(&entry)) {
            Some(existing) => {
                existing.absorb(entry);
                false
            }
            None => {
                self.entries.push(entry);
                true
            }
        };
        self.entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        inserted
    }
}
