//! The document-store collaborator.
//!
//! [`ChatStore`] lists the only capabilities a conversation view needs from a
//! real-time backend. The store assigns message timestamps, keeps them
//! strictly increasing per conversation and pushes full snapshots to every
//! live subscription after each write.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub use crate::chat::message_streaming::{MessageSnapshot, Subscription, TypingSnapshot};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::chat::error::Result;
use crate::chat::types::{Conversation, ConversationId, Message, TypingSignal, UserId, UserProfileSummary};

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Creates the conversation with empty last-message fields unless it exists.
    async fn ensure_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation>;

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>>;

    /// Appends a message with a server-assigned timestamp.
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        text: &str,
    ) -> Result<Message>;

    /// Sets `last_message_at` to the server clock and `last_sender_id` to `sender_id`.
    async fn update_last_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
    ) -> Result<()>;

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<MessageSnapshot>>;

    /// Merges the caller's typing record, stamping `updated_at` with the server clock.
    async fn upsert_typing(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        is_typing: bool,
    ) -> Result<TypingSignal>;

    async fn subscribe_typing(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<TypingSnapshot>>;

    async fn fetch_profile(&self, user_id: &UserId) -> Result<Option<UserProfileSummary>>;
}

/// Next server timestamp for a conversation: the wall clock, bumped by one
/// millisecond when it would not move past the previous message.
pub(crate) fn next_server_timestamp(
    now: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    // Storage keeps millisecond precision.
    let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    match previous {
        Some(previous) if now <= previous => previous + Duration::milliseconds(1),
        _ => now,
    }
}
