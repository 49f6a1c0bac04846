use std::fmt;

use thiserror::Error;

use crate::chat::database::DatabaseError;
use crate::chat::types::ConversationId;

pub type Result<T> = core::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("Conversation view is closed")]
    ViewClosed,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        ChatError::Database(DatabaseError::Sqlx(err))
    }
}

/// The fire-and-forget writes a conversation view performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOperation {
    EnsureConversation,
    AppendMessage,
    UpdateLastMessage,
    SetTyping,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteOperation::EnsureConversation => "ensure_conversation",
            WriteOperation::AppendMessage => "append_message",
            WriteOperation::UpdateLastMessage => "update_last_message",
            WriteOperation::SetTyping => "set_typing",
        };
        f.write_str(name)
    }
}

/// Receives failures of background writes.
///
/// The view never retries and never rolls back; the sink decides whether the
/// failure is surfaced anywhere.
pub trait ErrorSink: Send + Sync {
    fn report(&self, conversation_id: &ConversationId, operation: WriteOperation, error: &ChatError);
}

/// Default sink: log and continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, conversation_id: &ConversationId, operation: WriteOperation, error: &ChatError) {
        tracing::warn!(
            target: "jobchat::conversation_view::write",
            "Write {} failed for conversation {}: {}",
            operation,
            conversation_id,
            error
        );
    }
}
