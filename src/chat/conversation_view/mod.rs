//! Live view of one conversation.
//!
//! A view runs as a single tokio task that owns all of its state. It merges
//! the message feed, the typing feed, commands from the UI, profile lookups
//! and its timers, and republishes a full [`ViewState`] after each of them.
//! Every snapshot replaces the previous one wholesale.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

mod date_separators;
mod profiles;
mod scroll;
mod timeline;
mod typing;
mod writer;

#[cfg(test)]
mod tests;

pub use date_separators::{DateSeparator, active_label, day_label, group_by_day};
pub use profiles::{SenderBadge, initials};
pub use scroll::ScrollMetrics;
pub use timeline::{MessageRow, TimelineItem};
pub use typing::{active_typists, next_expiry};

use profiles::ProfileCache;
use scroll::ScrollTracker;
use timeline::build_timeline;
use typing::LocalTyping;
use writer::{PendingWrite, WriteQueue};

use crate::chat::error::{ChatError, ErrorSink, Result};
use crate::chat::identity::Identity;
use crate::chat::store::{ChatStore, MessageSnapshot, Subscription, TypingSnapshot};
use crate::chat::types::{ConversationId, Message, TypingSignal, UserId, UserProfileSummary};
use crate::chat::{AutoScrollPolicy, Clock, ViewConfig};

/// Everything a view needs from its surroundings.
pub struct ViewContext {
    pub store: Arc<dyn ChatStore>,
    pub identity: Identity,
    pub config: ViewConfig,
    pub error_sink: Arc<dyn ErrorSink>,
    pub clock: Arc<dyn Clock>,
}

/// One-shot instructions for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewEvent {
    ScrollToBottom { smooth: bool },
}

/// Everything the UI renders for a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub conversation_id: ConversationId,
    /// Ascending by `sent_at`.
    pub messages: Vec<Message>,
    pub timeline: Vec<TimelineItem>,
    pub message_count: usize,
    /// Badges for the first few active typists.
    pub typing: Vec<SenderBadge>,
    /// All active typists, including those without a badge.
    pub typing_count: usize,
    pub current_date_label: Option<String>,
    pub at_bottom: bool,
    pub show_jump_to_latest: bool,
    pub draft: String,
    pub closed: bool,
}

impl ViewState {
    fn empty(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            timeline: Vec::new(),
            message_count: 0,
            typing: Vec::new(),
            typing_count: 0,
            current_date_label: None,
            at_bottom: true,
            show_jump_to_latest: false,
            draft: String::new(),
            closed: false,
        }
    }
}

#[derive(Debug)]
enum ViewCommand {
    InputChanged(String),
    Blur,
    Send(String),
    Viewport {
        metrics: ScrollMetrics,
        separator_offsets: Vec<f64>,
    },
    JumpToLatest,
    Close,
}

type ProfileResult = (UserId, Result<Option<UserProfileSummary>>);

/// Handle to a running conversation view.
///
/// Dropping the handle closes the view.
pub struct ConversationHandle {
    conversation_id: ConversationId,
    commands: mpsc::UnboundedSender<ViewCommand>,
    state: watch::Receiver<ViewState>,
    events: mpsc::UnboundedReceiver<ViewEvent>,
    task: Option<JoinHandle<()>>,
}

impl ConversationHandle {
    /// Subscribes to both feeds, queues the create-if-absent write and starts
    /// the view task.
    ///
    /// A feed that cannot be opened is logged and treated as empty.
    pub async fn open(context: ViewContext, conversation_id: ConversationId) -> Self {
        let ViewContext {
            store,
            identity,
            config,
            error_sink,
            clock,
        } = context;

        let writer = WriteQueue::spawn(store.clone(), conversation_id.clone(), error_sink);
        writer.push(PendingWrite::EnsureConversation);

        let message_feed = match store.subscribe_messages(&conversation_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(
                    target: "jobchat::conversation_view::open",
                    "Failed to subscribe to messages of {}: {}",
                    conversation_id,
                    e
                );
                None
            }
        };
        let typing_feed = match store.subscribe_typing(&conversation_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(
                    target: "jobchat::conversation_view::open",
                    "Failed to subscribe to typing signals of {}: {}",
                    conversation_id,
                    e
                );
                None
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (profile_tx, profile_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ViewState::empty(conversation_id.clone()));

        let mut view = ConversationView {
            conversation_id: conversation_id.clone(),
            store,
            local_typing: LocalTyping::new(config.typing_idle_timeout, config.typing_refresh_interval),
            scroll: ScrollTracker::new(config.at_bottom_threshold_px, config.jump_to_latest_hide_after),
            identity,
            config,
            clock,
            writer,
            message_feed,
            typing_feed,
            profile_tx,
            profile_rx,
            commands: command_rx,
            state_tx,
            events: event_tx,
            messages: Vec::new(),
            typing_signals: Vec::new(),
            active_typists: Vec::new(),
            typing_expiry: None,
            profiles: ProfileCache::default(),
            scroll_top: 0.0,
            separator_offsets: Vec::new(),
            draft: String::new(),
        };
        view.apply_initial_snapshots();

        tracing::debug!(
            target: "jobchat::conversation_view::open",
            "Opened conversation {} with {} messages",
            conversation_id,
            view.messages.len()
        );

        let task = tokio::spawn(view.run());

        Self {
            conversation_id,
            commands: command_tx,
            state: state_rx,
            events: event_rx,
            task: Some(task),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    fn command(&self, command: ViewCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ChatError::ViewClosed)
    }

    /// The composer text changed.
    pub fn input_changed(&self, draft: impl Into<String>) -> Result<()> {
        self.command(ViewCommand::InputChanged(draft.into()))
    }

    /// The composer lost focus.
    pub fn blur(&self) -> Result<()> {
        self.command(ViewCommand::Blur)
    }

    /// Submits a message. Blank text is ignored. The draft is cleared right
    /// away; the write itself happens in the background.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        self.command(ViewCommand::Send(text.into()))
    }

    /// Reports a scroll or layout change. `separator_offsets` are the rendered
    /// tops of the date separators, in timeline order.
    pub fn viewport_changed(&self, metrics: ScrollMetrics, separator_offsets: Vec<f64>) -> Result<()> {
        self.command(ViewCommand::Viewport {
            metrics,
            separator_offsets,
        })
    }

    pub fn jump_to_latest(&self) -> Result<()> {
        self.command(ViewCommand::JumpToLatest)
    }

    /// The most recently published state.
    pub fn state(&self) -> ViewState {
        ViewState::clone(&self.state.borrow())
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    /// Waits until the published state satisfies `predicate`.
    pub async fn wait_for_state(
        &mut self,
        predicate: impl FnMut(&ViewState) -> bool,
    ) -> Result<ViewState> {
        self.state
            .wait_for(predicate)
            .await
            .map(|state| ViewState::clone(&state))
            .map_err(|_| ChatError::ViewClosed)
    }

    /// Waits for the next UI event. `None` once the view is closed and the
    /// queue is empty.
    pub async fn next_event(&mut self) -> Option<ViewEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<ViewEvent> {
        self.events.try_recv().ok()
    }

    /// Closes the view and waits for its task to finish. Pending writes are
    /// still flushed in the background.
    pub async fn close(mut self) {
        let _ = self.commands.send(ViewCommand::Close);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(
                target: "jobchat::conversation_view::close",
                "View task for {} ended abnormally: {}",
                self.conversation_id,
                e
            );
        }
    }
}

impl Drop for ConversationHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(ViewCommand::Close);
    }
}

fn sleep_until_opt(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

async fn next_snapshot<T: Clone>(feed: &mut Option<Subscription<T>>) -> Option<T> {
    match feed {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

struct ConversationView {
    conversation_id: ConversationId,
    store: Arc<dyn ChatStore>,
    identity: Identity,
    config: ViewConfig,
    clock: Arc<dyn Clock>,
    writer: WriteQueue,

    message_feed: Option<Subscription<MessageSnapshot>>,
    typing_feed: Option<Subscription<TypingSnapshot>>,
    profile_tx: mpsc::UnboundedSender<ProfileResult>,
    profile_rx: mpsc::UnboundedReceiver<ProfileResult>,
    commands: mpsc::UnboundedReceiver<ViewCommand>,
    state_tx: watch::Sender<ViewState>,
    events: mpsc::UnboundedSender<ViewEvent>,

    messages: Vec<Message>,
    typing_signals: Vec<TypingSignal>,
    active_typists: Vec<UserId>,
    typing_expiry: Option<Instant>,
    profiles: ProfileCache,
    local_typing: LocalTyping,
    scroll: ScrollTracker,
    scroll_top: f64,
    separator_offsets: Vec<f64>,
    draft: String,
}

impl ConversationView {
    fn apply_initial_snapshots(&mut self) {
        let messages = self
            .message_feed
            .as_mut()
            .map(|feed| std::mem::take(&mut feed.initial))
            .unwrap_or_default();
        let typing = self
            .typing_feed
            .as_mut()
            .map(|feed| std::mem::take(&mut feed.initial))
            .unwrap_or_default();

        self.apply_messages(messages);
        self.emit(ViewEvent::ScrollToBottom { smooth: true });
        self.apply_typing(typing);
        self.request_profiles();
        self.publish();
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(ViewCommand::Close) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                snapshot = next_snapshot(&mut self.message_feed) => {
                    match snapshot {
                        Some(snapshot) => {
                            if self.apply_messages(snapshot) {
                                self.follow_latest();
                            }
                            self.request_profiles();
                        }
                        None => {
                            tracing::warn!(
                                target: "jobchat::conversation_view::run",
                                "Message feed for {} closed",
                                self.conversation_id
                            );
                            self.message_feed = None;
                        }
                    }
                }
                snapshot = next_snapshot(&mut self.typing_feed) => {
                    match snapshot {
                        Some(snapshot) => {
                            self.apply_typing(snapshot);
                            self.request_profiles();
                        }
                        None => {
                            tracing::warn!(
                                target: "jobchat::conversation_view::run",
                                "Typing feed for {} closed",
                                self.conversation_id
                            );
                            self.typing_feed = None;
                        }
                    }
                }
                Some((user_id, result)) = self.profile_rx.recv() => {
                    if !self.profiles.resolve(user_id, result) {
                        continue;
                    }
                }
                _ = sleep_until_opt(self.local_typing.idle_deadline()) => {
                    let write = self.local_typing.on_idle(Instant::now());
                    self.write_typing(write);
                }
                _ = sleep_until_opt(self.scroll.hide_deadline()) => {
                    self.scroll.expire(Instant::now());
                }
                _ = sleep_until_opt(self.typing_expiry) => {
                    self.refresh_typists();
                }
            }
            self.publish();
        }

        self.shutdown();
    }

    fn handle_command(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::InputChanged(draft) => {
                let write = self.local_typing.on_input(&draft, Instant::now());
                self.draft = draft;
                self.write_typing(write);
            }
            ViewCommand::Blur => {
                let write = self.local_typing.clear();
                self.write_typing(write);
            }
            ViewCommand::Send(text) => self.send(text),
            ViewCommand::Viewport {
                metrics,
                separator_offsets,
            } => {
                self.scroll_top = metrics.scroll_top;
                self.separator_offsets = separator_offsets;
                self.scroll.on_scroll(&metrics, Instant::now());
            }
            ViewCommand::JumpToLatest => {
                self.scroll.dismiss();
                self.emit(ViewEvent::ScrollToBottom { smooth: true });
            }
            ViewCommand::Close => {}
        }
    }

    fn send(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let Some(sender) = self.identity.user_id().cloned() else {
            tracing::debug!(
                target: "jobchat::conversation_view::send",
                "Ignoring send to {} from an anonymous viewer",
                self.conversation_id
            );
            return;
        };

        self.draft.clear();
        let write = self.local_typing.clear();
        self.write_typing(write);
        self.writer.push(PendingWrite::Send { sender, text });
    }

    fn write_typing(&self, write: Option<bool>) {
        if let (Some(is_typing), Some(user)) = (write, self.identity.user_id()) {
            self.writer.push(PendingWrite::Typing {
                user: user.clone(),
                is_typing,
            });
        }
    }

    /// Replaces the message list. Returns true if it changed.
    fn apply_messages(&mut self, mut snapshot: MessageSnapshot) -> bool {
        snapshot.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
        if snapshot == self.messages {
            return false;
        }
        self.messages = snapshot;
        true
    }

    fn follow_latest(&self) {
        let follow = match self.config.auto_scroll {
            AutoScrollPolicy::Always => true,
            AutoScrollPolicy::WhenAtBottom => self.scroll.at_bottom(),
        };
        if follow {
            self.emit(ViewEvent::ScrollToBottom { smooth: true });
        }
    }

    fn apply_typing(&mut self, snapshot: TypingSnapshot) {
        self.typing_signals = snapshot;
        self.refresh_typists();
    }

    /// Re-filters the stored typing signals against the liveness window and
    /// schedules the next expiry.
    fn refresh_typists(&mut self) {
        let now = self.clock.now();
        let viewer = self.identity.user_id();
        let liveness = self.config.typing_liveness;

        self.active_typists = active_typists(&self.typing_signals, viewer, now, liveness);
        self.typing_expiry = next_expiry(&self.typing_signals, viewer, now, liveness).map(|at| {
            Instant::now() + (at - now).to_std().unwrap_or_default()
        });
    }

    fn request_profiles(&mut self) {
        if !self.identity.is_signed_in() {
            return;
        }
        let identity = &self.identity;
        let wanted = self
            .messages
            .iter()
            .map(|m| &m.sender_id)
            .chain(self.active_typists.iter())
            .filter(|user_id| !identity.is_mine(user_id));

        for user_id in self.profiles.claim_missing(wanted) {
            let store = self.store.clone();
            let results = self.profile_tx.clone();
            tokio::spawn(async move {
                let result = store.fetch_profile(&user_id).await;
                // The view may be gone by now.
                let _ = results.send((user_id, result));
            });
        }
    }

    fn emit(&self, event: ViewEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let now = self.clock.now();
        let timeline = build_timeline(
            &self.messages,
            &self.identity,
            &self.profiles,
            self.config.time_zone,
            now,
        );
        let current_date_label = active_label(
            &timeline.separators,
            &self.separator_offsets,
            self.scroll_top,
            self.config.separator_activation_slack_px,
        );
        let typing = self
            .active_typists
            .iter()
            .take(self.config.max_typing_badges)
            .map(|user_id| self.profiles.badge(user_id, &self.identity))
            .collect();

        self.state_tx.send_replace(ViewState {
            conversation_id: self.conversation_id.clone(),
            messages: self.messages.clone(),
            timeline: timeline.items,
            message_count: self.messages.len(),
            typing,
            typing_count: self.active_typists.len(),
            current_date_label,
            at_bottom: self.scroll.at_bottom(),
            show_jump_to_latest: self.scroll.show_jump_to_latest(),
            draft: self.draft.clone(),
            closed: false,
        });
    }

    fn shutdown(mut self) {
        let write = self.local_typing.clear();
        self.write_typing(write);

        self.message_feed = None;
        self.typing_feed = None;
        self.profile_rx.close();
        self.scroll.dismiss();
        self.typing_expiry = None;

        self.state_tx.send_modify(|state| {
            state.show_jump_to_latest = false;
            state.closed = true;
        });

        tracing::debug!(
            target: "jobchat::conversation_view::close",
            "Closed conversation {}",
            self.conversation_id
        );
    }
}
