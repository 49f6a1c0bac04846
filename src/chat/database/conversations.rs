use chrono::{DateTime, Utc};

use super::{
    Database, DatabaseError,
    utils::{parse_optional_timestamp, parse_timestamp},
};
use crate::chat::types::{Conversation, ConversationId, UserId};

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
struct ConversationRow {
    id: String,
    created_at: DateTime<Utc>,
    last_message_at: Option<DateTime<Utc>>,
    last_sender_id: Option<String>,
}

impl<'r, R> sqlx::FromRow<'r, R> for ConversationRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            created_at: parse_timestamp(row, "created_at")?,
            last_message_at: parse_optional_timestamp(row, "last_message_at")?,
            last_sender_id: row.try_get::<Option<String>, _>("last_sender_id")?,
        })
    }
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: ConversationId::from(row.id),
            created_at: row.created_at,
            last_message_at: row.last_message_at,
            last_sender_id: row.last_sender_id.map(UserId::from),
        }
    }
}

impl Conversation {
    pub(crate) async fn find_by_id(
        conversation_id: &ConversationId,
        database: &Database,
    ) -> Result<Option<Conversation>> {
        let row: Option<ConversationRow> =
            sqlx::query_as("SELECT * FROM conversations WHERE id = ?")
                .bind(conversation_id.as_str())
                .fetch_optional(&database.pool)
                .await?;
        Ok(row.map(Conversation::from))
    }

    /// Inserts the conversation unless it exists and returns the stored record.
    pub(crate) async fn find_or_create(
        conversation_id: &ConversationId,
        created_at: DateTime<Utc>,
        database: &Database,
    ) -> Result<Conversation> {
        let inserted = sqlx::query(
            "INSERT INTO conversations (id, created_at, last_message_at, last_sender_id)
             VALUES (?, ?, NULL, NULL)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(conversation_id.as_str())
        .bind(created_at.timestamp_millis())
        .execute(&database.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            tracing::debug!(
                target: "jobchat::database::conversations::find_or_create",
                "Created conversation {}",
                conversation_id
            );
        }

        Self::find_by_id(conversation_id, database)
            .await?
            .ok_or(DatabaseError::Sqlx(sqlx::Error::RowNotFound))
    }

    /// Returns false when no conversation with this id exists.
    pub(crate) async fn update_last_message(
        conversation_id: &ConversationId,
        sender_id: &UserId,
        sent_at: DateTime<Utc>,
        database: &Database,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE conversations SET last_message_at = ?, last_sender_id = ? WHERE id = ?",
        )
        .bind(sent_at.timestamp_millis())
        .bind(sender_id.as_str())
        .bind(conversation_id.as_str())
        .execute(&database.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }
}
