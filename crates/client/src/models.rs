use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
    pub expires_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub participants: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Chat {
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|participant| *participant != user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub client_message_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatEnvelope {
    pub chat: Chat,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatsEnvelope {
    pub chats: Vec<Chat>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageEnvelope {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesEnvelope {
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PresenceEnvelope {
    pub users: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: String,
}
