//! JSON bodies shared by the REST routes.

use parley_auth::User;
use parley_database::{Chat, ChatMessage};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.public_id,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatView {
    pub id: String,
    /// `[creator, peer]`.
    pub participants: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Chat> for ChatView {
    fn from(chat: Chat) -> Self {
        let [creator, peer] = chat.participants;
        Self {
            id: chat.public_id,
            participants: vec![creator, peer],
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageView {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    pub created_at: String,
}

impl From<ChatMessage> for MessageView {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.public_id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content,
            client_message_id: message.client_message_id,
            created_at: message.created_at,
        }
    }
}
