use once_cell::sync::OnceCell;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

pub mod chat;

pub use crate::chat::chat_list::ConversationSummary;
pub use crate::chat::conversation_view::{
    ConversationHandle, MessageRow, ScrollMetrics, SenderBadge, TimelineItem, ViewEvent, ViewState,
};
pub use crate::chat::error::{ChatError, ErrorSink, LogErrorSink, Result, WriteOperation};
pub use crate::chat::identity::{CurrentUser, Identity};
pub use crate::chat::store::{ChatStore, MemoryStore, SqliteStore, Subscription};
pub use crate::chat::types::{
    Conversation, ConversationId, Message, MessageId, TypingSignal, UserId, UserProfileSummary,
};
pub use crate::chat::{
    AutoScrollPolicy, ChatClient, ChatConfig, Clock, SystemClock, ViewConfig, ViewerTimeZone,
};

static TRACING_GUARDS: OnceCell<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceCell::new();
static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the process-wide tracing subscriber.
///
/// Logs go to stdout and to a daily rolling file in `logs_dir`. Only the first
/// call has any effect.
pub fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("jobchat")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        // A host application may already own the global subscriber.
        let _ = Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .try_init();
    });
}
