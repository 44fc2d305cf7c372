//! Repository for chat data access operations.

use crate::entities::chat::normalise_pair;
use crate::entities::{timestamp_now, Chat};
use crate::types::{ChatError, ChatResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use tracing::{debug, info};

const CHAT_COLUMNS: &str =
    "id, public_id, participant_low, participant_high, created_by, created_at, updated_at";

/// Repository for chat database operations
#[derive(Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Return the chat between `requester` and `peer`, creating it on first use.
    ///
    /// The pair is unordered. Concurrent calls for the same pair converge on
    /// one row through the `(participant_low, participant_high)` unique index.
    pub async fn find_or_create(&self, requester: &str, peer: &str) -> ChatResult<Chat> {
        if requester == peer {
            return Err(ChatError::validation(
                "a chat needs two distinct participants",
            ));
        }

        let known: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE public_id IN (?, ?)")
                .bind(requester)
                .bind(peer)
                .fetch_one(&self.pool)
                .await?;
        if known != 2 {
            return Err(ChatError::UserNotFound);
        }

        let (low, high) = normalise_pair(requester, peer);
        let public_id = cuid2::cuid();
        let now = timestamp_now();

        let result = sqlx::query(
            "INSERT INTO chats (public_id, participant_low, participant_high, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (participant_low, participant_high) DO NOTHING",
        )
        .bind(&public_id)
        .bind(low)
        .bind(high)
        .bind(requester)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!(
                chat_id = result.last_insert_rowid(),
                public_id = %public_id,
                created_by = requester,
                peer,
                "created new chat"
            );
        } else {
            debug!(requester, peer, "chat already exists for pair");
        }

        let row = sqlx::query(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE participant_low = ? AND participant_high = ?"
        ))
        .bind(low)
        .bind(high)
        .fetch_one(&self.pool)
        .await?;

        map_chat(&row)
    }

    /// Find chat by public ID
    pub async fn find_by_public_id(&self, public_id: &str) -> ChatResult<Option<Chat>> {
        fetch_chat(&self.pool, public_id).await
    }

    /// Chats the user participates in, most recently active first.
    pub async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<Chat>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE participant_low = ? OR participant_high = ?
             ORDER BY updated_at DESC, id DESC"
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_chat).collect()
    }

    /// Every chat, most recently active first.
    pub async fn list_all(&self) -> ChatResult<Vec<Chat>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats ORDER BY updated_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_chat).collect()
    }
}

pub(crate) async fn fetch_chat<'e, E>(executor: E, public_id: &str) -> ChatResult<Option<Chat>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats WHERE public_id = ?"
    ))
    .bind(public_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_chat).transpose()
}

fn map_chat(row: &SqliteRow) -> ChatResult<Chat> {
    let low: String = row.try_get("participant_low")?;
    let high: String = row.try_get("participant_high")?;
    let created_by: String = row.try_get("created_by")?;

    let participants = if created_by == high {
        [high, low]
    } else {
        [low, high]
    };

    Ok(Chat {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        participants,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
