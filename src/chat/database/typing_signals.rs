use chrono::{DateTime, Utc};

use super::{Database, DatabaseError, utils::parse_timestamp};
use crate::chat::types::{ConversationId, TypingSignal, UserId};

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
struct TypingSignalRow {
    user_id: String,
    is_typing: i64,
    updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for TypingSignalRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            is_typing: row.try_get("is_typing")?,
            updated_at: parse_timestamp(row, "updated_at")?,
        })
    }
}

impl From<TypingSignalRow> for TypingSignal {
    fn from(row: TypingSignalRow) -> Self {
        TypingSignal {
            user_id: UserId::from(row.user_id),
            is_typing: row.is_typing != 0,
            updated_at: row.updated_at,
        }
    }
}

impl TypingSignal {
    pub(crate) async fn find_by_conversation(
        conversation_id: &ConversationId,
        database: &Database,
    ) -> Result<Vec<TypingSignal>> {
        let rows: Vec<TypingSignalRow> = sqlx::query_as(
            "SELECT user_id, is_typing, updated_at FROM typing_signals
             WHERE conversation_id = ?
             ORDER BY user_id",
        )
        .bind(conversation_id.as_str())
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(TypingSignal::from).collect())
    }

    /// Last write wins; one row per (conversation, user).
    pub(crate) async fn upsert(
        conversation_id: &ConversationId,
        signal: &TypingSignal,
        database: &Database,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO typing_signals (conversation_id, user_id, is_typing, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(conversation_id, user_id) DO UPDATE SET
                 is_typing = excluded.is_typing,
                 updated_at = excluded.updated_at",
        )
        .bind(conversation_id.as_str())
        .bind(signal.user_id.as_str())
        .bind(i64::from(signal.is_typing))
        .bind(signal.updated_at.timestamp_millis())
        .execute(&database.pool)
        .await?;
        Ok(())
    }
}
