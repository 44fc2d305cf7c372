//! Parley database crate
//!
//! SQLite pool setup, migrations, and the chat and message stores.

use parley_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use entities::{timestamp_now, Chat, ChatMessage, CreateMessageRequest};
pub use migrations::{run_migrations, MIGRATOR};
pub use repos::{ChatRepository, MessageRepository};
pub use types::{ChatError, ChatResult, DatabaseError, DatabaseResult};

/// Open the pool and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
