//! Typing presence: filtering other participants' signals and pacing the
//! viewer's own.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::chat::types::{TypingSignal, UserId};

fn expires_at(signal: &TypingSignal, liveness: Duration) -> Option<DateTime<Utc>> {
    let liveness = chrono::Duration::from_std(liveness).ok()?;
    signal.updated_at.checked_add_signed(liveness)
}

fn is_live(signal: &TypingSignal, viewer: Option<&UserId>, now: DateTime<Utc>, liveness: Duration) -> bool {
    signal.is_typing
        && viewer != Some(&signal.user_id)
        && expires_at(signal, liveness).is_some_and(|expiry| now < expiry)
}

/// Users other than the viewer whose signal says typing and is younger than
/// `liveness`. The stored flag alone is never trusted.
pub fn active_typists(
    signals: &[TypingSignal],
    viewer: Option<&UserId>,
    now: DateTime<Utc>,
    liveness: Duration,
) -> Vec<UserId> {
    signals
        .iter()
        .filter(|signal| is_live(signal, viewer, now, liveness))
        .map(|signal| signal.user_id.clone())
        .collect()
}

/// When the first currently-live signal goes stale.
pub fn next_expiry(
    signals: &[TypingSignal],
    viewer: Option<&UserId>,
    now: DateTime<Utc>,
    liveness: Duration,
) -> Option<DateTime<Utc>> {
    signals
        .iter()
        .filter(|signal| is_live(signal, viewer, now, liveness))
        .filter_map(|signal| expires_at(signal, liveness))
        .min()
}

/// The viewer's own typing signal as last written, with the idle timer.
///
/// Each method returns the value to write, if any.
#[derive(Debug, Clone)]
pub(crate) struct LocalTyping {
    idle_timeout: Duration,
    refresh_interval: Duration,
    typing: bool,
    last_refresh: Option<Instant>,
    idle_deadline: Option<Instant>,
}

impl LocalTyping {
    pub(crate) fn new(idle_timeout: Duration, refresh_interval: Duration) -> Self {
        Self {
            idle_timeout,
            refresh_interval,
            typing: false,
            last_refresh: None,
            idle_deadline: None,
        }
    }

    pub(crate) fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    pub(crate) fn is_typing(&self) -> bool {
        self.typing
    }

    pub(crate) fn on_input(&mut self, draft: &str, now: Instant) -> Option<bool> {
        if draft.trim().is_empty() {
            return self.clear();
        }

        self.idle_deadline = Some(now + self.idle_timeout);
        let refresh_due = self
            .last_refresh
            .is_none_or(|last| now.duration_since(last) >= self.refresh_interval);
        if self.typing && !refresh_due {
            return None;
        }

        self.typing = true;
        self.last_refresh = Some(now);
        Some(true)
    }

    pub(crate) fn on_idle(&mut self, now: Instant) -> Option<bool> {
        match self.idle_deadline {
            Some(deadline) if deadline <= now => self.clear(),
            _ => None,
        }
    }

    pub(crate) fn clear(&mut self) -> Option<bool> {
        self.idle_deadline = None;
        self.last_refresh = None;
        if !self.typing {
            return None;
        }
        self.typing = false;
        Some(false)
    }
}
