use chrono::{DateTime, Utc};

use super::{Database, DatabaseError, utils::datetime_from_millis, utils::parse_timestamp};
use crate::chat::types::{ConversationId, Message, MessageId, UserId};

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
struct MessageRow {
    id: String,
    sender_id: String,
    text: String,
    sent_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for MessageRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            text: row.try_get("text")?,
            sent_at: parse_timestamp(row, "sent_at")?,
        })
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: MessageId::from(row.id),
            sender_id: UserId::from(row.sender_id),
            text: row.text,
            sent_at: row.sent_at,
        }
    }
}

impl Message {
    /// All messages of a conversation, oldest first.
    pub(crate) async fn find_by_conversation(
        conversation_id: &ConversationId,
        database: &Database,
    ) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, sender_id, text, sent_at FROM messages
             WHERE conversation_id = ?
             ORDER BY sent_at, rowid",
        )
        .bind(conversation_id.as_str())
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Inserts a message stamped with `now`, or one millisecond after the
    /// newest message of the conversation when the clock has not moved past it.
    ///
    /// The timestamp is computed inside the INSERT so concurrent writers cannot
    /// observe the same predecessor.
    pub(crate) async fn insert(
        conversation_id: &ConversationId,
        sender_id: &UserId,
        text: &str,
        now: DateTime<Utc>,
        database: &Database,
    ) -> Result<Message> {
        let id = MessageId::generate();
        let sent_at_ms: i64 = sqlx::query_scalar(
            "INSERT INTO messages (id, conversation_id, sender_id, text, sent_at)
             VALUES (?, ?, ?, ?, MAX(?, COALESCE(
                 (SELECT MAX(sent_at) FROM messages WHERE conversation_id = ?) + 1, 0)))
             RETURNING sent_at",
        )
        .bind(id.as_str())
        .bind(conversation_id.as_str())
        .bind(sender_id.as_str())
        .bind(text)
        .bind(now.timestamp_millis())
        .bind(conversation_id.as_str())
        .fetch_one(&database.pool)
        .await?;

        Ok(Message {
            id,
            sender_id: sender_id.clone(),
            text: text.to_string(),
            sent_at: datetime_from_millis(sent_at_ms)?,
        })
    }
}
