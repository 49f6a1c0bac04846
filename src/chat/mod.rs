use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

pub mod chat_list;
pub mod conversation_view;
pub mod database;
pub mod error;
pub mod identity;
pub mod message_streaming;
pub mod store;
pub mod types;

use crate::init_tracing;
use conversation_view::{ConversationHandle, ViewContext};
use database::Database;
use error::{ChatError, ErrorSink, LogErrorSink, Result};
use identity::Identity;
use store::{ChatStore, SqliteStore};
use types::ConversationId;

#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Directory for application data
    pub data_dir: PathBuf,

    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Tunables for every conversation view opened by the client
    pub view: ViewConfig,
}

impl ChatConfig {
    pub fn new(data_dir: &Path, logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };

        Self {
            data_dir: data_dir.join(env_suffix),
            logs_dir: logs_dir.join(env_suffix),
            view: ViewConfig::default(),
        }
    }

    pub fn with_view_config(mut self, view: ViewConfig) -> Self {
        self.view = view;
        self
    }
}

/// What happens to the viewport when the message list changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoScrollPolicy {
    /// Scroll to the newest message on every change, even while the viewer
    /// is reading history.
    #[default]
    Always,
    /// Only follow new messages when the viewport already sits at the bottom.
    WhenAtBottom,
}

/// Time zone used to bucket messages into calendar days and format times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewerTimeZone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    /// Typing records older than this are ignored, whatever their flag says.
    pub typing_liveness: Duration,
    /// The viewer's own typing signal is cleared after this much input silence.
    pub typing_idle_timeout: Duration,
    /// Minimum gap between two consecutive "still typing" writes. Input changes
    /// inside the gap do not write, so typing is not persisted per keystroke.
    pub typing_refresh_interval: Duration,
    /// Distance from the content bottom under which the view counts as at bottom.
    pub at_bottom_threshold_px: f64,
    /// The jump-to-latest affordance hides after this long without scrolling.
    pub jump_to_latest_hide_after: Duration,
    /// A date separator becomes the sticky label once it is within this many
    /// pixels of the top of the viewport.
    pub separator_activation_slack_px: f64,
    /// How many typists get an avatar badge.
    pub max_typing_badges: usize,
    pub auto_scroll: AutoScrollPolicy,
    pub time_zone: ViewerTimeZone,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            typing_liveness: Duration::from_secs(7),
            typing_idle_timeout: Duration::from_secs(3),
            typing_refresh_interval: Duration::from_secs(2),
            at_bottom_threshold_px: 12.0,
            jump_to_latest_hide_after: Duration::from_secs(4),
            separator_activation_slack_px: 8.0,
            max_typing_badges: 3,
            auto_scroll: AutoScrollPolicy::Always,
            time_zone: ViewerTimeZone::Local,
        }
    }
}

/// Wall clock used for liveness checks and "Today"/"Yesterday" labels.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Entry point for a UI shell: holds the store, the signed-in identity and
/// the view settings, and opens conversation views.
pub struct ChatClient {
    store: Arc<dyn ChatStore>,
    identity: Identity,
    view_config: ViewConfig,
    error_sink: Arc<dyn ErrorSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("identity", &self.identity)
            .field("view_config", &self.view_config)
            .field("store", &"<REDACTED>")
            .finish()
    }
}

impl ChatClient {
    /// Creates the data and log directories, starts logging and opens the
    /// SQLite-backed store.
    pub async fn initialize(config: ChatConfig, identity: Identity) -> Result<Self> {
        let data_dir = &config.data_dir;
        let logs_dir = &config.logs_dir;

        for dir in [data_dir, logs_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                tracing::error!(
                    target: "jobchat::initialize",
                    "Failed to create directory {:?}: {}",
                    dir,
                    e
                );
                ChatError::Filesystem(e)
            })?;
        }

        init_tracing(logs_dir);

        tracing::debug!(
            target: "jobchat::initialize",
            "Logging initialized in directory: {:?}",
            logs_dir
        );

        let database = Arc::new(Database::new(data_dir.join("jobchat.sqlite")).await?);
        let store: Arc<dyn ChatStore> = Arc::new(SqliteStore::new(database));

        Ok(Self::with_store(store, identity).with_view_config(config.view))
    }

    pub fn with_store(store: Arc<dyn ChatStore>, identity: Identity) -> Self {
        Self {
            store,
            identity,
            view_config: ViewConfig::default(),
            error_sink: Arc::new(LogErrorSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_view_config(mut self, view_config: ViewConfig) -> Self {
        self.view_config = view_config;
        self
    }

    pub fn with_error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = error_sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Replaces the viewer identity for views opened from now on.
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub async fn open_conversation(&self, conversation_id: ConversationId) -> ConversationHandle {
        let context = ViewContext {
            store: self.store.clone(),
            identity: self.identity.clone(),
            config: self.view_config.clone(),
            error_sink: self.error_sink.clone(),
            clock: self.clock.clone(),
        };
        ConversationHandle::open(context, conversation_id).await
    }
}
