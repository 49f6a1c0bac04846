use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{ChatStore, MessageSnapshot, Subscription, TypingSnapshot, next_server_timestamp};
use crate::chat::error::{ChatError, Result};
use crate::chat::message_streaming::SnapshotStreamManager;
use crate::chat::types::{
    Conversation, ConversationId, Message, MessageId, TypingSignal, UserId, UserProfileSummary,
};

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    typing: HashMap<ConversationId, BTreeMap<UserId, TypingSignal>>,
}

impl MemoryState {
    fn message_snapshot(&self, conversation_id: &ConversationId) -> MessageSnapshot {
        self.messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    fn typing_snapshot(&self, conversation_id: &ConversationId) -> TypingSnapshot {
        self.typing
            .get(conversation_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// In-process store.
///
/// Like a document database, the message and typing collections of a
/// conversation exist independently of the conversation record itself.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    profiles: DashMap<UserId, UserProfileSummary>,
    message_streams: SnapshotStreamManager<MessageSnapshot>,
    typing_streams: SnapshotStreamManager<TypingSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, user_id: impl Into<UserId>, profile: UserProfileSummary) {
        self.profiles.insert(user_id.into(), profile);
    }

    /// Overwrites a typing record verbatim, keeping its `updated_at`.
    ///
    /// Useful for replaying records written by other clients.
    pub async fn put_typing_signal(&self, conversation_id: &ConversationId, signal: TypingSignal) {
        let mut state = self.state.lock().await;
        state
            .typing
            .entry(conversation_id.clone())
            .or_default()
            .insert(signal.user_id.clone(), signal);
        let snapshot = state.typing_snapshot(conversation_id);
        self.typing_streams.emit(conversation_id, snapshot);
    }

    pub fn message_subscriber_count(&self, conversation_id: &ConversationId) -> usize {
        self.message_streams.receiver_count(conversation_id)
    }

    pub fn typing_subscriber_count(&self, conversation_id: &ConversationId) -> usize {
        self.typing_streams.receiver_count(conversation_id)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn ensure_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        let mut state = self.state.lock().await;
        let conversation = state
            .conversations
            .entry(conversation_id.clone())
            .or_insert_with(|| {
                tracing::debug!(
                    target: "jobchat::store::memory::ensure_conversation",
                    "Creating conversation {}",
                    conversation_id
                );
                Conversation::new(conversation_id.clone(), Utc::now())
            });
        Ok(conversation.clone())
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state.conversations.get(conversation_id).cloned())
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        text: &str,
    ) -> Result<Message> {
        let mut state = self.state.lock().await;
        let messages = state.messages.entry(conversation_id.clone()).or_default();
        let sent_at = next_server_timestamp(Utc::now(), messages.last().map(|m| m.sent_at));
        let message = Message {
            id: MessageId::generate(),
            sender_id: sender_id.clone(),
            text: text.to_string(),
            sent_at,
        };
        messages.push(message.clone());

        let snapshot = state.message_snapshot(conversation_id);
        self.message_streams.emit(conversation_id, snapshot);
        Ok(message)
    }

    async fn update_last_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.clone()))?;
        conversation.last_message_at = Some(next_server_timestamp(Utc::now(), None));
        conversation.last_sender_id = Some(sender_id.clone());
        Ok(())
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<MessageSnapshot>> {
        let state = self.state.lock().await;
        let updates = self.message_streams.subscribe(conversation_id);
        let initial = state.message_snapshot(conversation_id);
        Ok(Subscription::new(conversation_id.clone(), initial, updates))
    }

    async fn upsert_typing(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        is_typing: bool,
    ) -> Result<TypingSignal> {
        let signal = TypingSignal {
            user_id: user_id.clone(),
            is_typing,
            updated_at: next_server_timestamp(Utc::now(), None),
        };
        self.put_typing_signal(conversation_id, signal.clone()).await;
        Ok(signal)
    }

    async fn subscribe_typing(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<TypingSnapshot>> {
        let state = self.state.lock().await;
        let updates = self.typing_streams.subscribe(conversation_id);
        let initial = state.typing_snapshot(conversation_id);
        Ok(Subscription::new(conversation_id.clone(), initial, updates))
    }

    async fn fetch_profile(&self, user_id: &UserId) -> Result<Option<UserProfileSummary>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }
}
