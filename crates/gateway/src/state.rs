use std::sync::Arc;

use parley_auth::{AuthSession, Authenticator, User};
use parley_config::RelayConfig;
use parley_database::{ChatRepository, MessageRepository};
use parley_relay::RelayServer;
use parley_runtime::BackendServices;

use crate::ApiError;

#[derive(Clone)]
pub struct AppState {
    authenticator: Authenticator,
    chats: ChatRepository,
    messages: MessageRepository,
    relay: Arc<RelayServer>,
    relay_config: Arc<RelayConfig>,
    allowed_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(
        authenticator: Authenticator,
        chats: ChatRepository,
        messages: MessageRepository,
        relay: Arc<RelayServer>,
        relay_config: RelayConfig,
    ) -> Self {
        Self {
            authenticator,
            chats,
            messages,
            relay,
            relay_config: Arc::new(relay_config),
            allowed_origins: Arc::from(Vec::new()),
        }
    }

    pub fn from_services(services: &BackendServices) -> Self {
        Self::new(
            services.authenticator.clone(),
            services.chats.clone(),
            services.messages.clone(),
            Arc::clone(&services.relay),
            services.relay_config.clone(),
        )
    }

    /// Restrict CORS to these origins. Empty allows any origin.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Arc::from(origins);
        self
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn chats(&self) -> &ChatRepository {
        &self.chats
    }

    pub fn messages(&self) -> &MessageRepository {
        &self.messages
    }

    pub fn relay(&self) -> &Arc<RelayServer> {
        &self.relay
    }

    pub fn relay_config(&self) -> &RelayConfig {
        &self.relay_config
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }
}
