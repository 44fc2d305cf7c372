use parley_relay::{ClientEvent, SendMessage, ServerEvent};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::driver::{ConnectionStatus, DriverOptions, Emitted, RelayDriver, RelayHandle};
use crate::error::{ClientError, ClientResult};
use crate::models::{Chat, Message, UserProfile};
use crate::reconcile::Conversation;
use crate::rest::RestClient;
use crate::typing::{typing_event, TypingSignal};

/// Failures the user should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotice {
    AppendFailed {
        chat_id: String,
        client_message_id: String,
        error: String,
    },
}

/// A signed-in session: REST calls plus one relay connection.
pub struct ChatClient {
    user: UserProfile,
    rest: RestClient,
    relay: RelayHandle,
    notices: broadcast::Sender<ClientNotice>,
}

impl ChatClient {
    /// Start the relay connection for the user behind `rest`'s session.
    ///
    /// The receiver yields every event the relay delivers.
    pub async fn connect(
        rest: RestClient,
        options: DriverOptions,
    ) -> ClientResult<(Self, mpsc::Receiver<ServerEvent>)> {
        let user = rest.me().await?;
        let (relay, events) = RelayDriver::spawn(rest.relay_url()?, user.id.clone(), options);
        let (notices, _) = broadcast::channel(32);

        let client = Self {
            user,
            rest,
            relay,
            notices,
        };
        Ok((client, events))
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn relay(&self) -> &RelayHandle {
        &self.relay
    }

    pub fn status(&self) -> ConnectionStatus {
        self.relay.status()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<ClientNotice> {
        self.notices.subscribe()
    }

    pub async fn open_chat(&self, peer_id: &str) -> ClientResult<Chat> {
        self.rest.open_chat(peer_id).await
    }

    /// Fetch the stored history of `chat_id`.
    pub async fn load_conversation(&self, chat_id: &str) -> ClientResult<Conversation> {
        let messages = self.rest.list_messages(chat_id).await?;
        let mut conversation = Conversation::new(chat_id);
        conversation.merge_stored(&messages);
        Ok(conversation)
    }

    /// Send `content` to `peer_id` in `chat_id`.
    ///
    /// The relay copy goes out first, or is queued while disconnected. The
    /// durable append is attempted either way and its result returned; a
    /// failed append is also published as [`ClientNotice::AppendFailed`].
    pub async fn send_message(
        &self,
        chat_id: &str,
        peer_id: &str,
        content: &str,
    ) -> ClientResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let client_message_id = Uuid::new_v4().to_string();

        let event = ClientEvent::SendMessage(SendMessage {
            sender_id: self.user.id.clone(),
            receiver_id: peer_id.to_string(),
            content: content.to_string(),
            message_id: Some(client_message_id.clone()),
        });
        match self.relay.emit(event).await {
            Emitted::Sent => debug!(chat_id, %client_message_id, "message relayed"),
            Emitted::Queued => debug!(chat_id, %client_message_id, "relay offline, message queued"),
        }

        match self
            .rest
            .append_message(chat_id, content, Some(&client_message_id))
            .await
        {
            Ok(message) => Ok(message),
            Err(err) => {
                warn!(chat_id, %client_message_id, error = %err, "failed to store message");
                let _ = self.notices.send(ClientNotice::AppendFailed {
                    chat_id: chat_id.to_string(),
                    client_message_id,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Best-effort typing signal. Dropped while disconnected.
    pub fn send_typing(&self, peer_id: &str, signal: TypingSignal) -> bool {
        self.relay
            .emit_if_connected(typing_event(signal, &self.user.id, peer_id))
            .is_ok()
    }

    pub fn shutdown(&self) {
        self.relay.shutdown();
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.relay.shutdown();
    }
}
