//! Per-conversation broadcast channels.
//!
//! Channels are created lazily on first subscribe and removed once an emit
//! finds that every receiver has been dropped.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::chat::types::ConversationId;

const BUFFER_SIZE: usize = 64;

pub struct SnapshotStreamManager<T: Clone> {
    streams: DashMap<ConversationId, broadcast::Sender<T>>,
}

impl<T: Clone> SnapshotStreamManager<T> {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
        }
    }

    pub fn subscribe(&self, conversation_id: &ConversationId) -> broadcast::Receiver<T> {
        self.streams
            .entry(conversation_id.clone())
            .or_insert_with(|| broadcast::channel(BUFFER_SIZE).0)
            .subscribe()
    }

    pub fn emit(&self, conversation_id: &ConversationId, snapshot: T) {
        if let Some(sender) = self.streams.get(conversation_id) {
            if sender.send(snapshot).is_err() && sender.receiver_count() == 0 {
                drop(sender);
                self.streams
                    .remove_if(conversation_id, |_, sender| sender.receiver_count() == 0);
            }
        }
    }

    /// Whether anyone is (or was, until the next emit) listening to this conversation.
    pub fn has_stream(&self, conversation_id: &ConversationId) -> bool {
        self.streams.contains_key(conversation_id)
    }

    pub fn receiver_count(&self, conversation_id: &ConversationId) -> usize {
        self.streams
            .get(conversation_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl<T: Clone> Default for SnapshotStreamManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
