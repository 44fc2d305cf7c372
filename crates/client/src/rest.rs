//! Typed client for the REST boundary.

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::models::{
    Chat, ChatEnvelope, ChatsEnvelope, ErrorEnvelope, Message, MessageEnvelope,
    MessagesEnvelope, PresenceEnvelope, Session, UserProfile,
};

#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `ws://` (or `wss://`) address of the relay endpoint, carrying the session token.
    ///
    /// The token travels form-encoded in the query string.
    pub fn relay_url(&self) -> ClientResult<String> {
        let token = self.token.as_deref().ok_or(ClientError::NotAuthenticated)?;
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {err}", self.base_url)))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => return Err(ClientError::InvalidUrl(format!("unsupported scheme {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::InvalidUrl(self.base_url.clone()))?;
        let path = format!("{}/ws", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut().clear().append_pair("token", token);
        Ok(url.into())
    }

    /// Create an account and keep its session.
    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> ClientResult<Session> {
        let request = self.http.post(self.url("/api/auth/register")).json(&json!({
            "email": email,
            "password": password,
            "display_name": display_name,
        }));
        let session: Session = parse(request.send().await?).await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    /// Sign in and keep the session.
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<Session> {
        let request = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({"email": email, "password": password}));
        let session: Session = parse(request.send().await?).await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    pub async fn logout(&mut self) -> ClientResult<()> {
        let request = self.authorized(self.http.post(self.url("/api/auth/logout")))?;
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        self.token = None;
        Ok(())
    }

    pub async fn me(&self) -> ClientResult<UserProfile> {
        let request = self.authorized(self.http.get(self.url("/api/auth/me")))?;
        parse(request.send().await?).await
    }

    /// Find or create the chat with `peer_id`.
    pub async fn open_chat(&self, peer_id: &str) -> ClientResult<Chat> {
        let request = self
            .authorized(self.http.post(self.url("/api/chats")))?
            .json(&json!({"peer_id": peer_id}));
        let envelope: ChatEnvelope = parse(request.send().await?).await?;
        Ok(envelope.chat)
    }

    pub async fn list_chats(&self) -> ClientResult<Vec<Chat>> {
        let request = self.authorized(self.http.get(self.url("/api/chats")))?;
        let envelope: ChatsEnvelope = parse(request.send().await?).await?;
        Ok(envelope.chats)
    }

    pub async fn append_message(
        &self,
        chat_id: &str,
        content: &str,
        client_message_id: Option<&str>,
    ) -> ClientResult<Message> {
        let request = self
            .authorized(self.http.post(self.url("/api/messages")))?
            .json(&json!({
                "chat_id": chat_id,
                "content": content,
                "client_message_id": client_message_id,
            }));
        let envelope: MessageEnvelope = parse(request.send().await?).await?;
        debug!(chat_id, message_id = %envelope.message.id, "message stored");
        Ok(envelope.message)
    }

    pub async fn list_messages(&self, chat_id: &str) -> ClientResult<Vec<Message>> {
        let request = self.authorized(self.http.get(self.url(&format!("/api/messages/{chat_id}"))))?;
        let envelope: MessagesEnvelope = parse(request.send().await?).await?;
        Ok(envelope.messages)
    }

    pub async fn presence(&self) -> ClientResult<Vec<String>> {
        let request = self.authorized(self.http.get(self.url("/api/presence")))?;
        let envelope: PresenceEnvelope = parse(request.send().await?).await?;
        Ok(envelope.users)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> ClientResult<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ClientError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn api_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let message = match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error)
            .unwrap_or(body),
        Err(err) => err.to_string(),
    };
    ClientError::Api { status, message }
}
