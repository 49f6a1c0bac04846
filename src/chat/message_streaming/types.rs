use tokio::sync::broadcast;

use crate::chat::types::{ConversationId, Message, TypingSignal};

/// All messages of a conversation, ascending by `sent_at`.
pub type MessageSnapshot = Vec<Message>;

/// Every typing record stored under a conversation, stale ones included.
pub type TypingSnapshot = Vec<TypingSignal>;

/// A live feed: the snapshot taken at subscribe time plus a receiver for the
/// snapshots that follow it.
///
/// The receiver is registered before the initial snapshot is read, so no write
/// can fall between the two. Dropping the subscription unsubscribes.
pub struct Subscription<T: Clone> {
    pub conversation_id: ConversationId,
    pub initial: T,
    updates: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    pub fn new(conversation_id: ConversationId, initial: T, updates: broadcast::Receiver<T>) -> Self {
        Self {
            conversation_id,
            initial,
            updates,
        }
    }

    /// Waits for the next snapshot. `None` once the feed is closed.
    ///
    /// A lagging receiver resumes at the oldest snapshot still buffered and the
    /// newer ones follow. Dropped snapshots are superseded by later ones.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            match self.updates.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        target: "jobchat::message_streaming::subscription",
                        "Subscription for {} lagged, skipped {} snapshots",
                        self.conversation_id,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
