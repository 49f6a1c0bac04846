use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::{Notify, broadcast};

use super::*;
use crate::chat::error::WriteOperation;
use crate::chat::identity::CurrentUser;
use crate::chat::store::MemoryStore;
use crate::chat::types::{Conversation, MessageId};
use crate::chat::{ChatClient, ViewerTimeZone};

/// Wall clock driven by tokio's (pausable) clock.
struct TokioClock {
    base: DateTime<Utc>,
    start: Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            base: Utc::now(),
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}

#[derive(Default)]
struct RecordingSink {
    reports: Mutex<Vec<WriteOperation>>,
}

impl RecordingSink {
    fn reports(&self) -> Vec<WriteOperation> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, _: &ConversationId, operation: WriteOperation, _: &ChatError) {
        self.reports.lock().unwrap().push(operation);
    }
}

/// Store whose feeds are driven by the test and whose profile lookups block
/// until released.
struct ScriptedStore {
    messages: broadcast::Sender<MessageSnapshot>,
    typing: broadcast::Sender<TypingSnapshot>,
    profile_requested: Notify,
    release_profiles: Notify,
    fail_writes: bool,
}

impl ScriptedStore {
    fn new(fail_writes: bool) -> Self {
        Self {
            messages: broadcast::channel(16).0,
            typing: broadcast::channel(16).0,
            profile_requested: Notify::new(),
            release_profiles: Notify::new(),
            fail_writes,
        }
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes {
            return Err(ChatError::Other(anyhow::anyhow!("store offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for ScriptedStore {
    async fn ensure_conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        self.check_write()?;
        Ok(Conversation::new(conversation_id.clone(), Utc::now()))
    }

    async fn get_conversation(&self, _: &ConversationId) -> Result<Option<Conversation>> {
        Ok(None)
    }

    async fn append_message(
        &self,
        _: &ConversationId,
        sender_id: &UserId,
        text: &str,
    ) -> Result<Message> {
        self.check_write()?;
        Ok(Message {
            id: MessageId::generate(),
            sender_id: sender_id.clone(),
            text: text.to_string(),
            sent_at: Utc::now(),
        })
    }

    async fn update_last_message(&self, _: &ConversationId, _: &UserId) -> Result<()> {
        self.check_write()
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<MessageSnapshot>> {
        Ok(Subscription::new(
            conversation_id.clone(),
            Vec::new(),
            self.messages.subscribe(),
        ))
    }

    async fn upsert_typing(
        &self,
        _: &ConversationId,
        user_id: &UserId,
        is_typing: bool,
    ) -> Result<TypingSignal> {
        self.check_write()?;
        Ok(TypingSignal {
            user_id: user_id.clone(),
            is_typing,
            updated_at: Utc::now(),
        })
    }

    async fn subscribe_typing(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<TypingSnapshot>> {
        Ok(Subscription::new(
            conversation_id.clone(),
            Vec::new(),
            self.typing.subscribe(),
        ))
    }

    async fn fetch_profile(&self, _: &UserId) -> Result<Option<UserProfileSummary>> {
        self.profile_requested.notify_one();
        self.release_profiles.notified().await;
        Ok(Some(UserProfileSummary::new(
            Some("Late Arrival".to_string()),
            None,
            None,
        )))
    }
}

fn conversation() -> ConversationId {
    ConversationId::from("app-42")
}

fn signed_in(id: &str) -> Identity {
    CurrentUser::new(id).into()
}

fn test_config() -> ViewConfig {
    ViewConfig {
        time_zone: ViewerTimeZone::Fixed(FixedOffset::east_opt(0).unwrap()),
        ..ViewConfig::default()
    }
}

fn client(store: Arc<dyn ChatStore>, identity: Identity) -> ChatClient {
    ChatClient::with_store(store, identity)
        .with_view_config(test_config())
        .with_clock(Arc::new(TokioClock::new()))
}

fn scripted_message(sender: &str, text: &str, millis: i64) -> Message {
    Message {
        id: MessageId::generate(),
        sender_id: UserId::from(sender),
        text: text.to_string(),
        sent_at: DateTime::from_timestamp_millis(millis).unwrap(),
    }
}

fn texts(state: &ViewState) -> Vec<&str> {
    state.messages.iter().map(|m| m.text.as_str()).collect()
}

async fn wait_for_conversation(
    store: &MemoryStore,
    predicate: impl Fn(&Conversation) -> bool,
) -> Conversation {
    for _ in 0..200 {
        if let Some(conversation) = store.get_conversation(&conversation()).await.unwrap()
            && predicate(&conversation)
        {
            return conversation;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("conversation never reached the expected state");
}

#[tokio::test]
async fn test_open_creates_conversation_record() {
    let store = Arc::new(MemoryStore::new());
    let handle = client(store.clone(), Identity::Anonymous)
        .open_conversation(conversation())
        .await;

    let created = wait_for_conversation(&store, |_| true).await;
    assert_eq!(created.last_message_at, None);
    assert_eq!(created.last_sender_id, None);
    assert_eq!(handle.state().message_count, 0);
    assert_eq!(store.message_subscriber_count(&conversation()), 1);
    assert_eq!(store.typing_subscriber_count(&conversation()), 1);
}

#[tokio::test]
async fn test_send_appends_and_updates_metadata() {
    let store = Arc::new(MemoryStore::new());
    let mut handle = client(store.clone(), signed_in("seeker"))
        .open_conversation(conversation())
        .await;

    handle.input_changed("When can I start?").unwrap();
    handle.send("When can I start?").unwrap();

    let state = handle.wait_for_state(|s| s.message_count == 1).await.unwrap();
    assert_eq!(texts(&state), vec!["When can I start?"]);
    assert_eq!(state.draft, "");

    let TimelineItem::Message(row) = &state.timeline[1] else {
        panic!("expected a message row after the date separator");
    };
    assert!(row.is_mine);
    assert!(row.show_avatar);

    let updated = wait_for_conversation(&store, |c| c.last_sender_id.is_some()).await;
    assert_eq!(updated.last_sender_id, Some(UserId::from("seeker")));
    assert!(!updated.has_unread_for(Some(&UserId::from("seeker"))));
    assert!(updated.has_unread_for(Some(&UserId::from("employer"))));
}

#[tokio::test]
async fn test_blank_send_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let mut handle = client(store.clone(), signed_in("seeker"))
        .open_conversation(conversation())
        .await;

    handle.input_changed("   ").unwrap();
    handle.send(" \n\t ").unwrap();
    handle.input_changed("draft").unwrap();
    handle.wait_for_state(|s| s.draft == "draft").await.unwrap();

    let messages = store.subscribe_messages(&conversation()).await.unwrap();
    assert!(messages.initial.is_empty());
    let created = wait_for_conversation(&store, |_| true).await;
    assert_eq!(created.last_sender_id, None);
}

#[tokio::test]
async fn test_anonymous_viewer_cannot_send() {
    let store = Arc::new(MemoryStore::new());
    let mut handle = client(store.clone(), Identity::Anonymous)
        .open_conversation(conversation())
        .await;

    handle.input_changed("hello").unwrap();
    handle.send("hello").unwrap();
    handle.input_changed("still here").unwrap();
    handle.wait_for_state(|s| s.draft == "still here").await.unwrap();

    let messages = store.subscribe_messages(&conversation()).await.unwrap();
    assert!(messages.initial.is_empty());
    let typing = store.subscribe_typing(&conversation()).await.unwrap();
    assert!(typing.initial.is_empty());

    // The conversation record is still ensured for anonymous viewers.
    let created = wait_for_conversation(&store, |_| true).await;
    assert_eq!(created.last_sender_id, None);
}

#[tokio::test]
async fn test_rendered_order_follows_timestamps_not_delivery() {
    let store = Arc::new(ScriptedStore::new(false));
    let mut handle = client(store.clone(), Identity::Anonymous)
        .open_conversation(conversation())
        .await;

    store
        .messages
        .send(vec![
            scripted_message("a", "second", 2_000),
            scripted_message("b", "first", 1_000),
        ])
        .unwrap();
    let state = handle.wait_for_state(|s| s.message_count == 2).await.unwrap();
    assert_eq!(texts(&state), vec!["first", "second"]);

    store
        .messages
        .send(vec![
            scripted_message("a", "third", 3_000),
            scripted_message("b", "first", 1_000),
            scripted_message("a", "second", 2_000),
        ])
        .unwrap();
    let state = handle.wait_for_state(|s| s.message_count == 3).await.unwrap();
    assert_eq!(texts(&state), vec!["first", "second", "third"]);
}

#[tokio::test(start_paused = true)]
async fn test_typing_signal_clears_after_idle_timeout() {
    let store = Arc::new(MemoryStore::new());
    let mut typing = store.subscribe_typing(&conversation()).await.unwrap();
    let handle = client(store.clone(), signed_in("seeker"))
        .open_conversation(conversation())
        .await;

    let started = Instant::now();
    handle.input_changed("I am avail").unwrap();
    assert!(typing.next().await.unwrap()[0].is_typing);

    let cleared = typing.next().await.unwrap();
    assert!(!cleared[0].is_typing);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn test_blur_clears_typing_signal() {
    let store = Arc::new(MemoryStore::new());
    let mut typing = store.subscribe_typing(&conversation()).await.unwrap();
    let handle = client(store.clone(), signed_in("seeker"))
        .open_conversation(conversation())
        .await;

    handle.input_changed("typing").unwrap();
    assert!(typing.next().await.unwrap()[0].is_typing);
    handle.blur().unwrap();
    assert!(!typing.next().await.unwrap()[0].is_typing);
}

#[tokio::test(start_paused = true)]
async fn test_stale_typists_are_filtered_and_pruned() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(TokioClock::new());
    let now = clock.now();
    for (user, age) in [("fresh", 2), ("stale", 10)] {
        store
            .put_typing_signal(
                &conversation(),
                TypingSignal {
                    user_id: UserId::from(user),
                    is_typing: true,
                    updated_at: now - chrono::Duration::seconds(age),
                },
            )
            .await;
    }

    let mut handle = ChatClient::with_store(store.clone(), Identity::Anonymous)
        .with_view_config(test_config())
        .with_clock(clock)
        .open_conversation(conversation())
        .await;

    let state = handle.state();
    assert_eq!(state.typing_count, 1);
    assert_eq!(state.typing[0].user_id, UserId::from("fresh"));

    let started = Instant::now();
    let state = handle.wait_for_state(|s| s.typing_count == 0).await.unwrap();
    assert!(state.typing.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn test_own_typing_signal_is_not_shown() {
    let store = Arc::new(MemoryStore::new());
    let mut handle = client(store.clone(), signed_in("seeker"))
        .open_conversation(conversation())
        .await;

    handle.input_changed("hi").unwrap();
    store
        .upsert_typing(&conversation(), &UserId::from("employer"), true)
        .await
        .unwrap();

    let state = handle.wait_for_state(|s| s.typing_count == 1).await.unwrap();
    assert_eq!(state.typing[0].user_id, UserId::from("employer"));
}

#[tokio::test]
async fn test_typing_badges_are_capped() {
    let store = Arc::new(MemoryStore::new());
    for user in ["u-1", "u-2", "u-3", "u-4"] {
        store
            .upsert_typing(&conversation(), &UserId::from(user), true)
            .await
            .unwrap();
    }

    let handle = ChatClient::with_store(store.clone(), Identity::Anonymous)
        .with_view_config(test_config())
        .open_conversation(conversation())
        .await;

    let state = handle.state();
    assert_eq!(state.typing_count, 4);
    assert_eq!(state.typing.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_jump_to_latest_hides_after_inactivity() {
    let store = Arc::new(MemoryStore::new());
    let mut handle = client(store, Identity::Anonymous)
        .open_conversation(conversation())
        .await;

    let away = ScrollMetrics::new(500.0, 1000.0, 400.0);
    handle.viewport_changed(away, Vec::new()).unwrap();
    let state = handle.wait_for_state(|s| s.show_jump_to_latest).await.unwrap();
    assert!(!state.at_bottom);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(handle.state().show_jump_to_latest);

    // Another scroll restarts the timer.
    handle.viewport_changed(away, Vec::new()).unwrap();
    let rescrolled = Instant::now();
    let state = handle.wait_for_state(|s| !s.show_jump_to_latest).await.unwrap();
    assert!(rescrolled.elapsed() >= Duration::from_secs(4));
    assert!(!state.at_bottom);
}

#[tokio::test]
async fn test_reaching_bottom_clears_jump_to_latest() {
    let store = Arc::new(MemoryStore::new());
    let mut handle = client(store, Identity::Anonymous)
        .open_conversation(conversation())
        .await;

    handle
        .viewport_changed(ScrollMetrics::new(500.0, 1000.0, 400.0), Vec::new())
        .unwrap();
    handle.wait_for_state(|s| s.show_jump_to_latest).await.unwrap();

    handle
        .viewport_changed(ScrollMetrics::new(590.0, 1000.0, 400.0), Vec::new())
        .unwrap();
    let state = handle
        .wait_for_state(|s| s.at_bottom && !s.show_jump_to_latest)
        .await
        .unwrap();
    assert!(state.at_bottom);
}

#[tokio::test]
async fn test_jump_to_latest_requests_scroll() {
    let store = Arc::new(MemoryStore::new());
    let mut handle = client(store, Identity::Anonymous)
        .open_conversation(conversation())
        .await;
    assert_eq!(
        handle.next_event().await,
        Some(ViewEvent::ScrollToBottom { smooth: true })
    );

    handle
        .viewport_changed(ScrollMetrics::new(0.0, 1000.0, 400.0), Vec::new())
        .unwrap();
    handle.jump_to_latest().unwrap();

    assert_eq!(
        handle.next_event().await,
        Some(ViewEvent::ScrollToBottom { smooth: true })
    );
    let state = handle.wait_for_state(|s| !s.show_jump_to_latest).await.unwrap();
    assert!(!state.show_jump_to_latest);
}

#[tokio::test]
async fn test_new_messages_always_scroll_to_bottom() {
    let store = Arc::new(MemoryStore::new());
    let mut handle = client(store.clone(), signed_in("seeker"))
        .open_conversation(conversation())
        .await;
    assert_eq!(
        handle.next_event().await,
        Some(ViewEvent::ScrollToBottom { smooth: true })
    );

    handle
        .viewport_changed(ScrollMetrics::new(0.0, 1000.0, 400.0), Vec::new())
        .unwrap();
    handle.wait_for_state(|s| !s.at_bottom).await.unwrap();

    store
        .append_message(&conversation(), &UserId::from("employer"), "Interview at 10?")
        .await
        .unwrap();
    handle.wait_for_state(|s| s.message_count == 1).await.unwrap();
    assert_eq!(
        handle.try_next_event(),
        Some(ViewEvent::ScrollToBottom { smooth: true })
    );
}

#[tokio::test]
async fn test_when_at_bottom_policy_leaves_history_reader_alone() {
    let store = Arc::new(MemoryStore::new());
    let config = ViewConfig {
        auto_scroll: AutoScrollPolicy::WhenAtBottom,
        ..test_config()
    };
    let mut handle = ChatClient::with_store(store.clone(), Identity::Anonymous)
        .with_view_config(config)
        .open_conversation(conversation())
        .await;
    handle.next_event().await;

    handle
        .viewport_changed(ScrollMetrics::new(0.0, 1000.0, 400.0), Vec::new())
        .unwrap();
    handle.wait_for_state(|s| !s.at_bottom).await.unwrap();

    store
        .append_message(&conversation(), &UserId::from("employer"), "ping")
        .await
        .unwrap();
    handle.wait_for_state(|s| s.message_count == 1).await.unwrap();
    assert_eq!(handle.try_next_event(), None);
}

#[tokio::test]
async fn test_date_label_follows_scroll() {
    let store = Arc::new(MemoryStore::new());
    store
        .append_message(&conversation(), &UserId::from("employer"), "Morning!")
        .await
        .unwrap();
    let mut handle = client(store, Identity::Anonymous)
        .open_conversation(conversation())
        .await;

    assert_eq!(handle.state().current_date_label.as_deref(), Some("Today"));

    handle
        .viewport_changed(ScrollMetrics::new(0.0, 600.0, 400.0), vec![0.0])
        .unwrap();
    let state = handle.wait_for_state(|s| !s.at_bottom).await.unwrap();
    assert_eq!(state.current_date_label.as_deref(), Some("Today"));
}

#[tokio::test]
async fn test_sender_profiles_feed_badges() {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(
        "employer",
        UserProfileSummary::new(
            Some("Erin Moss".to_string()),
            None,
            Some("https://cdn.example/erin.png".to_string()),
        ),
    );
    store
        .append_message(&conversation(), &UserId::from("employer"), "Welcome aboard")
        .await
        .unwrap();
    store
        .append_message(&conversation(), &UserId::from("ghost"), "hi")
        .await
        .unwrap();

    let mut handle = client(store, signed_in("seeker"))
        .open_conversation(conversation())
        .await;

    let state = handle
        .wait_for_state(|s| {
            s.timeline.iter().any(|item| {
                matches!(item, TimelineItem::Message(row) if row.sender.initials == "EM")
            })
        })
        .await
        .unwrap();

    let rows: Vec<&MessageRow> = state
        .timeline
        .iter()
        .filter_map(|item| match item {
            TimelineItem::Message(row) => Some(row),
            TimelineItem::DateSeparator { .. } => None,
        })
        .collect();
    assert_eq!(
        rows[0].sender.avatar_url.as_deref(),
        Some("https://cdn.example/erin.png")
    );
    // Unknown users fall back to initials from their id.
    assert_eq!(rows[1].sender.initials, "G");
}

#[tokio::test]
async fn test_failed_writes_go_to_error_sink() {
    let store = Arc::new(ScriptedStore::new(true));
    let sink = Arc::new(RecordingSink::default());
    let mut handle = client(store, signed_in("seeker"))
        .with_error_sink(sink.clone())
        .open_conversation(conversation())
        .await;

    handle.input_changed("hello").unwrap();
    handle.send("hello").unwrap();

    for _ in 0..200 {
        if sink.reports().len() >= 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        sink.reports(),
        vec![
            WriteOperation::EnsureConversation,
            WriteOperation::SetTyping,
            WriteOperation::SetTyping,
            WriteOperation::AppendMessage,
        ]
    );

    // The view keeps working and the draft stays cleared.
    handle.input_changed("again").unwrap();
    let state = handle.wait_for_state(|s| s.draft == "again").await.unwrap();
    assert!(!state.closed);
}

#[tokio::test]
async fn test_close_clears_typing_and_unsubscribes() {
    let store = Arc::new(MemoryStore::new());
    let mut typing = store.subscribe_typing(&conversation()).await.unwrap();
    let handle = client(store.clone(), signed_in("seeker"))
        .open_conversation(conversation())
        .await;
    let mut state = handle.subscribe_state();

    handle.input_changed("about to leave").unwrap();
    assert!(typing.next().await.unwrap()[0].is_typing);

    handle.close().await;

    assert!(state.borrow_and_update().closed);
    assert_eq!(store.message_subscriber_count(&conversation()), 0);
    // Only the test's own typing subscription is left.
    assert_eq!(store.typing_subscriber_count(&conversation()), 1);
    assert!(!typing.next().await.unwrap()[0].is_typing);
}

#[tokio::test]
async fn test_dropping_handle_closes_view() {
    let store = Arc::new(MemoryStore::new());
    let handle = client(store.clone(), Identity::Anonymous)
        .open_conversation(conversation())
        .await;
    let mut state = handle.subscribe_state();

    drop(handle);

    for _ in 0..200 {
        if state.borrow_and_update().closed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(state.borrow().closed);
    assert_eq!(store.message_subscriber_count(&conversation()), 0);
}

#[tokio::test]
async fn test_commands_after_close_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let handle = client(store, Identity::Anonymous)
        .open_conversation(conversation())
        .await;
    let mut state = handle.subscribe_state();

    let commands = handle.commands.clone();
    handle.close().await;
    assert!(state.borrow().closed);
    assert!(commands.send(ViewCommand::Blur).is_err());
}

#[tokio::test]
async fn test_unmount_during_profile_fetch_is_safe() {
    let store = Arc::new(ScriptedStore::new(false));
    let handle = client(store.clone(), signed_in("seeker"))
        .open_conversation(conversation())
        .await;
    let mut state = handle.subscribe_state();

    store
        .messages
        .send(vec![scripted_message("employer", "hello", 1_000)])
        .unwrap();
    store.profile_requested.notified().await;

    handle.close().await;
    store.release_profiles.notify_one();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let final_state = ViewState::clone(&state.borrow_and_update());
    assert!(final_state.closed);
    let TimelineItem::Message(row) = &final_state.timeline[1] else {
        panic!("expected a message row after the date separator");
    };
    assert_eq!(row.sender.display_name, None);
    assert_eq!(row.sender.initials, "E");
}
