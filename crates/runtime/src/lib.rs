use std::sync::Arc;

use anyhow::{Context, Result};
use parley_auth::Authenticator;
use parley_config::{AppConfig, RelayConfig};
use parley_database::{initialize_database, ChatRepository, MessageRepository};
use parley_relay::RelayServer;
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Install the global fmt subscriber. `RUST_LOG` overrides the `info` default.
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub chats: ChatRepository,
    pub messages: MessageRepository,
    pub relay: Arc<RelayServer>,
    pub relay_config: RelayConfig,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());
        let relay = Arc::new(RelayServer::from_config(&config.relay));

        info!(
            outbound_buffer = config.relay.outbound_buffer,
            identify_timeout_seconds = config.relay.identify_timeout_seconds,
            require_token = config.relay.require_token,
            "relay ready"
        );

        Ok(Self {
            chats: ChatRepository::new(db_pool.clone()),
            messages: MessageRepository::new(db_pool.clone()),
            db_pool,
            authenticator,
            relay,
            relay_config: config.relay.clone(),
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
