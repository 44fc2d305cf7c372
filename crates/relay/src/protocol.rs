//! Wire format of the relay.
//!
//! Every frame is a JSON text frame of the form `{"event": <name>, "data": <payload>}`.
//! Event names are fixed: `addUser`, `sendMessage`, `typing`, `typing stop`
//! from clients and `getMessage`, `typing`, `typing stop`, `getUsers` from the relay.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announce the user behind this connection.
    #[serde(rename = "addUser")]
    Identify(String),
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessage),
    #[serde(rename = "typing")]
    TypingStart(Typing),
    #[serde(rename = "typing stop")]
    TypingStop(Typing),
}

/// Events the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "getMessage")]
    Message(DeliveredMessage),
    #[serde(rename = "typing")]
    TypingStart(Typing),
    #[serde(rename = "typing stop")]
    TypingStop(Typing),
    /// Everyone currently online.
    #[serde(rename = "getUsers")]
    Presence(Vec<OnlineUser>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    /// Client generated id used to correlate the relayed copy with the stored one.
    #[serde(default, alias = "clientMessageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub sender_id: String,
    pub receiver_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredMessage {
    pub sender_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// RFC 3339 time at which the relay forwarded the message.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: String,
}

impl ClientEvent {
    pub fn decode(frame: &str) -> Result<Self, RelayError> {
        serde_json::from_str(frame).map_err(RelayError::Decode)
    }

    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(RelayError::Encode)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Identify(_) => "addUser",
            ClientEvent::SendMessage(_) => "sendMessage",
            ClientEvent::TypingStart(_) => "typing",
            ClientEvent::TypingStop(_) => "typing stop",
        }
    }
}

impl ServerEvent {
    pub fn decode(frame: &str) -> Result<Self, RelayError> {
        serde_json::from_str(frame).map_err(RelayError::Decode)
    }

    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(RelayError::Encode)
    }

    pub fn presence<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ServerEvent::Presence(
            users
                .into_iter()
                .map(|user_id| OnlineUser {
                    user_id: user_id.into(),
                })
                .collect(),
        )
    }
}
