use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{ChatStore, MessageSnapshot, Subscription, TypingSnapshot, next_server_timestamp};
use crate::chat::database::Database;
use crate::chat::error::{ChatError, Result};
use crate::chat::message_streaming::SnapshotStreamManager;
use crate::chat::types::{
    Conversation, ConversationId, Message, TypingSignal, UserId, UserProfileSummary,
};

/// Store backed by the local SQLite database.
///
/// Each write is followed by a fresh snapshot read which is pushed to the
/// live subscriptions of that conversation. Writes and their snapshot emits
/// are serialized so subscribers never see an older snapshot after a newer one.
pub struct SqliteStore {
    database: Arc<Database>,
    write_lock: Mutex<()>,
    message_streams: SnapshotStreamManager<MessageSnapshot>,
    typing_streams: SnapshotStreamManager<TypingSnapshot>,
}

impl SqliteStore {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            database,
            write_lock: Mutex::new(()),
            message_streams: SnapshotStreamManager::new(),
            typing_streams: SnapshotStreamManager::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Stores a profile summary so that views can resolve names and avatars.
    pub async fn save_profile(&self, user_id: &UserId, profile: &UserProfileSummary) -> Result<()> {
        profile.save(user_id, Utc::now(), &self.database).await?;
        Ok(())
    }

    async fn emit_messages(&self, conversation_id: &ConversationId) -> Result<()> {
        if !self.message_streams.has_stream(conversation_id) {
            return Ok(());
        }
        let snapshot = Message::find_by_conversation(conversation_id, &self.database).await?;
        self.message_streams.emit(conversation_id, snapshot);
        Ok(())
    }

    async fn emit_typing(&self, conversation_id: &ConversationId) -> Result<()> {
        if !self.typing_streams.has_stream(conversation_id) {
            return Ok(());
        }
        let snapshot = TypingSignal::find_by_conversation(conversation_id, &self.database).await?;
        self.typing_streams.emit(conversation_id, snapshot);
        Ok(())
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn ensure_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        let conversation =
            Conversation::find_or_create(conversation_id, Utc::now(), &self.database).await?;
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        Ok(Conversation::find_by_id(conversation_id, &self.database).await?)
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        text: &str,
    ) -> Result<Message> {
        let _guard = self.write_lock.lock().await;
        let message =
            Message::insert(conversation_id, sender_id, text, Utc::now(), &self.database).await?;

        tracing::debug!(
            target: "jobchat::store::sqlite::append_message",
            "Appended message {} to conversation {}",
            message.id,
            conversation_id
        );

        if let Err(e) = self.emit_messages(conversation_id).await {
            // The message is stored; subscribers will catch up on the next write.
            tracing::warn!(
                target: "jobchat::store::sqlite::append_message",
                "Failed to publish message snapshot for {}: {}",
                conversation_id,
                e
            );
        }
        Ok(message)
    }

    async fn update_last_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
    ) -> Result<()> {
        let now = next_server_timestamp(Utc::now(), None);
        let updated =
            Conversation::update_last_message(conversation_id, sender_id, now, &self.database)
                .await?;
        if !updated {
            return Err(ChatError::ConversationNotFound(conversation_id.clone()));
        }
        Ok(())
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<MessageSnapshot>> {
        let _guard = self.write_lock.lock().await;
        let updates = self.message_streams.subscribe(conversation_id);
        let initial = Message::find_by_conversation(conversation_id, &self.database).await?;
        Ok(Subscription::new(conversation_id.clone(), initial, updates))
    }

    async fn upsert_typing(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        is_typing: bool,
    ) -> Result<TypingSignal> {
        let _guard = self.write_lock.lock().await;
        let signal = TypingSignal {
            user_id: user_id.clone(),
            is_typing,
            updated_at: next_server_timestamp(Utc::now(), None),
        };
        TypingSignal::upsert(conversation_id, &signal, &self.database).await?;

        if let Err(e) = self.emit_typing(conversation_id).await {
            tracing::warn!(
                target: "jobchat::store::sqlite::upsert_typing",
                "Failed to publish typing snapshot for {}: {}",
                conversation_id,
                e
            );
        }
        Ok(signal)
    }

    async fn subscribe_typing(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<TypingSnapshot>> {
        let _guard = self.write_lock.lock().await;
        let updates = self.typing_streams.subscribe(conversation_id);
        let initial = TypingSignal::find_by_conversation(conversation_id, &self.database).await?;
        Ok(Subscription::new(conversation_id.clone(), initial, updates))
    }

    async fn fetch_profile(&self, user_id: &UserId) -> Result<Option<UserProfileSummary>> {
        Ok(UserProfileSummary::find_by_user_id(user_id, &self.database).await?)
    }
}
