//! Background writer for the view's fire-and-forget store writes.
//!
//! Writes run one at a time in submission order, so a clearing typing signal
//! can never be overtaken by an earlier "typing" write.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::chat::error::{ErrorSink, WriteOperation};
use crate::chat::store::ChatStore;
use crate::chat::types::{ConversationId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingWrite {
    EnsureConversation,
    Send { sender: UserId, text: String },
    Typing { user: UserId, is_typing: bool },
}

#[derive(Clone)]
pub(crate) struct WriteQueue {
    sender: mpsc::UnboundedSender<PendingWrite>,
}

impl WriteQueue {
    /// Starts the writer task. It exits once every queue handle is dropped
    /// and the remaining writes are done.
    pub(crate) fn spawn(
        store: Arc<dyn ChatStore>,
        conversation_id: ConversationId,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, conversation_id, error_sink, receiver));
        Self { sender }
    }

    pub(crate) fn push(&self, write: PendingWrite) {
        if self.sender.send(write).is_err() {
            tracing::warn!(
                target: "jobchat::conversation_view::writer",
                "Writer task is gone, dropping write"
            );
        }
    }
}

async fn run_writer(
    store: Arc<dyn ChatStore>,
    conversation_id: ConversationId,
    error_sink: Arc<dyn ErrorSink>,
    mut receiver: mpsc::UnboundedReceiver<PendingWrite>,
) {
    tracing::debug!(
        target: "jobchat::conversation_view::writer",
        "Starting writer for conversation {}",
        conversation_id
    );

    while let Some(write) = receiver.recv().await {
        match write {
            PendingWrite::EnsureConversation => {
                if let Err(e) = store.ensure_conversation(&conversation_id).await {
                    error_sink.report(&conversation_id, WriteOperation::EnsureConversation, &e);
                }
            }
            PendingWrite::Send { sender, text } => {
                if let Err(e) = store.append_message(&conversation_id, &sender, &text).await {
                    error_sink.report(&conversation_id, WriteOperation::AppendMessage, &e);
                    continue;
                }
                if let Err(e) = store.update_last_message(&conversation_id, &sender).await {
                    error_sink.report(&conversation_id, WriteOperation::UpdateLastMessage, &e);
                }
            }
            PendingWrite::Typing { user, is_typing } => {
                if let Err(e) = store.upsert_typing(&conversation_id, &user, is_typing).await {
                    error_sink.report(&conversation_id, WriteOperation::SetTyping, &e);
                }
            }
        }
    }

    tracing::debug!(
        target: "jobchat::conversation_view::writer",
        "Writer for conversation {} drained, exiting",
        conversation_id
    );
}
