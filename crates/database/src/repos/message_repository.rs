//! Repository for message data access operations.

use crate::entities::{timestamp_now, ChatMessage, CreateMessageRequest};
use crate::repos::chat_repository::fetch_chat;
use crate::types::{ChatError, ChatResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Append-only message log, one sequence per chat.
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a message.
    ///
    /// Content is trimmed before storage. Empty content and senders that are not
    /// participants of the chat are rejected with [`ChatError::Validation`].
    /// The chat's `updated_at` moves forward in the same transaction; a rejected
    /// append rolls it back.
    pub async fn append(&self, request: &CreateMessageRequest) -> ChatResult<ChatMessage> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(ChatError::validation("message content must not be empty"));
        }

        let now = timestamp_now();
        let mut tx = self.pool.begin().await?;

        // Write before reading so the transaction holds the write lock from its
        // first statement; a read lock cannot be upgraded once another writer commits.
        let touched =
            sqlx::query("UPDATE chats SET updated_at = max(updated_at, ?) WHERE public_id = ?")
                .bind(&now)
                .bind(&request.chat_id)
                .execute(&mut *tx)
                .await?;
        if touched.rows_affected() == 0 {
            return Err(ChatError::ChatNotFound);
        }

        let chat = fetch_chat(&mut *tx, &request.chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound)?;

        if !chat.has_participant(&request.sender_id) {
            return Err(ChatError::validation(
                "sender is not a participant of this chat",
            ));
        }

        let public_id = cuid2::cuid();

        let result = sqlx::query(
            "INSERT INTO messages (public_id, chat_id, sender_id, content, client_message_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(chat.id)
        .bind(&request.sender_id)
        .bind(content)
        .bind(&request.client_message_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let message_id = result.last_insert_rowid();
        info!(
            message_id,
            public_id = %public_id,
            chat_id = %chat.public_id,
            sender_id = %request.sender_id,
            "created new message"
        );

        Ok(ChatMessage {
            id: message_id,
            public_id,
            chat_id: chat.public_id,
            sender_id: request.sender_id.clone(),
            content: content.to_string(),
            client_message_id: request.client_message_id.clone(),
            created_at: now,
        })
    }

    /// All messages of a chat in creation order.
    ///
    /// Not paginated: the whole history is returned in one call.
    pub async fn list_for_chat(&self, chat_id: &str) -> ChatResult<Vec<ChatMessage>> {
        let chat = fetch_chat(&self.pool, chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound)?;

        let rows = sqlx::query(
            "SELECT id, public_id, sender_id, content, client_message_id, created_at
             FROM messages WHERE chat_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(chat.id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| map_message(row, &chat.public_id))
            .collect()
    }

    pub async fn count_for_chat(&self, chat_id: &str) -> ChatResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages m JOIN chats c ON c.id = m.chat_id WHERE c.public_id = ?",
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

fn map_message(row: &SqliteRow, chat_public_id: &str) -> ChatResult<ChatMessage> {
    Ok(ChatMessage {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        chat_id: chat_public_id.to_string(),
        sender_id: row.try_get("sender_id")?,
        content: row.try_get("content")?,
        client_message_id: row.try_get("client_message_id")?,
        created_at: row.try_get("created_at")?,
    })
}
