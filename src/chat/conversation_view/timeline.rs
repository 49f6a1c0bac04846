//! Message rows interleaved with day separators, in render order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::date_separators::{DateSeparator, group_by_day};
use super::profiles::{ProfileCache, SenderBadge};
use crate::chat::ViewerTimeZone;
use crate::chat::identity::Identity;
use crate::chat::types::Message;

/// One rendered bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    pub message: Message,
    pub is_mine: bool,
    /// "HH:MM" in the viewer's time zone.
    pub time_label: String,
    /// Same sender and same day as the message above.
    pub joins_previous: bool,
    /// Same sender and same day as the message below.
    pub joins_next: bool,
    /// Only the last bubble of a run carries the avatar.
    pub show_avatar: bool,
    pub sender: SenderBadge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineItem {
    DateSeparator { day: NaiveDate, label: String },
    Message(MessageRow),
}

pub(crate) struct Timeline {
    pub(crate) items: Vec<TimelineItem>,
    pub(crate) separators: Vec<DateSeparator>,
}

pub(crate) fn build_timeline(
    messages: &[Message],
    identity: &Identity,
    profiles: &ProfileCache,
    time_zone: ViewerTimeZone,
    now: DateTime<Utc>,
) -> Timeline {
    let groups = group_by_day(messages, time_zone, now);
    let days: Vec<NaiveDate> = messages
        .iter()
        .map(|m| time_zone.local_date(m.sent_at))
        .collect();
    let joins = |a: usize, b: usize| {
        messages[a].sender_id == messages[b].sender_id && days[a] == days[b]
    };

    let mut items = Vec::with_capacity(messages.len() + groups.len());
    let mut groups_iter = groups.iter().peekable();

    for (index, message) in messages.iter().enumerate() {
        if let Some((separator, _)) = groups_iter.next_if(|(_, start)| *start == index) {
            items.push(TimelineItem::DateSeparator {
                day: separator.day,
                label: separator.label.clone(),
            });
        }

        let joins_previous = index > 0 && joins(index - 1, index);
        let joins_next = index + 1 < messages.len() && joins(index, index + 1);

        items.push(TimelineItem::Message(MessageRow {
            message: message.clone(),
            is_mine: identity.is_mine(&message.sender_id),
            time_label: time_zone.time_label(message.sent_at),
            joins_previous,
            joins_next,
            show_avatar: !joins_next,
            sender: profiles.badge(&message.sender_id, identity),
        }));
    }

    Timeline {
        items,
        separators: groups.into_iter().map(|(separator, _)| separator).collect(),
    }
}
