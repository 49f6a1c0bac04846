use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::chat::ChatClient;
use crate::chat::store::ChatStore;
use crate::chat::types::{Conversation, ConversationId, UserId};

/// One row of the applications/conversations list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_sender_id: Option<UserId>,
    /// Someone other than the viewer sent the most recent message.
    pub has_unread: bool,
}

impl ConversationSummary {
    fn from_conversation(
        conversation_id: ConversationId,
        conversation: Option<&Conversation>,
        viewer: Option<&UserId>,
    ) -> Self {
        Self {
            conversation_id,
            last_message_at: conversation.and_then(|c| c.last_message_at),
            last_sender_id: conversation.and_then(|c| c.last_sender_id.clone()),
            has_unread: conversation.is_some_and(|c| c.has_unread_for(viewer)),
        }
    }
}

/// Most recent activity first. Conversations without messages keep their
/// input order at the end.
fn sort_by_activity(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
}

impl ChatClient {
    /// Looks up every conversation concurrently and derives its unread flag
    /// for the current viewer.
    ///
    /// A conversation that is missing or fails to load is reported without
    /// data instead of failing the whole list.
    pub async fn conversation_summaries(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Vec<ConversationSummary> {
        let store = self.store();
        let lookups = conversation_ids
            .iter()
            .map(|id| async move { (id, store.get_conversation(id).await) });
        let results = join_all(lookups).await;

        let viewer = self.identity().user_id();
        let mut summaries: Vec<ConversationSummary> = results
            .into_iter()
            .map(|(id, result)| {
                let conversation = match result {
                    Ok(conversation) => conversation,
                    Err(e) => {
                        tracing::warn!(
                            target: "jobchat::chat_list::conversation_summaries",
                            "Failed to load conversation {}: {}",
                            id,
                            e
                        );
                        None
                    }
                };
                ConversationSummary::from_conversation(id.clone(), conversation.as_ref(), viewer)
            })
            .collect();

        sort_by_activity(&mut summaries);
        summaries
    }
}
