//! Calendar-day grouping and the sticky date label.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ViewerTimeZone;
use crate::chat::types::Message;

impl ViewerTimeZone {
    pub fn local_date(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        match self {
            ViewerTimeZone::Local => timestamp.with_timezone(&Local).date_naive(),
            ViewerTimeZone::Fixed(offset) => timestamp.with_timezone(offset).date_naive(),
        }
    }

    /// "HH:MM" in the viewer's zone.
    pub fn time_label(&self, timestamp: DateTime<Utc>) -> String {
        match self {
            ViewerTimeZone::Local => timestamp.with_timezone(&Local).format("%H:%M").to_string(),
            ViewerTimeZone::Fixed(offset) => {
                timestamp.with_timezone(offset).format("%H:%M").to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSeparator {
    pub day: NaiveDate,
    pub label: String,
}

/// "Today", "Yesterday", or e.g. "Mon, Jan 6".
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(day) {
        "Yesterday".to_string()
    } else {
        day.format("%a, %b %-d").to_string()
    }
}

/// Splits an ordered message list into runs of consecutive messages sharing a
/// calendar day. Returns `(separator, index of the run's first message)`.
pub fn group_by_day(
    messages: &[Message],
    time_zone: ViewerTimeZone,
    now: DateTime<Utc>,
) -> Vec<(DateSeparator, usize)> {
    let today = time_zone.local_date(now);
    let mut separators = Vec::new();
    let mut current_day: Option<NaiveDate> = None;

    for (index, message) in messages.iter().enumerate() {
        let day = time_zone.local_date(message.sent_at);
        if current_day != Some(day) {
            current_day = Some(day);
            separators.push((
                DateSeparator {
                    day,
                    label: day_label(day, today),
                },
                index,
            ));
        }
    }

    separators
}

/// Label of the last separator whose rendered top is at or above the scroll
/// offset. Falls back to the first separator when none has been passed yet.
///
/// `offsets` holds the rendered top of each separator, in timeline order. A
/// shorter list (layout not reported yet) only considers the known ones.
pub fn active_label(
    separators: &[DateSeparator],
    offsets: &[f64],
    scroll_top: f64,
    slack_px: f64,
) -> Option<String> {
    let mut active = separators.first()?;
    for (separator, offset) in separators.iter().zip(offsets) {
        if offset - slack_px <= scroll_top {
            active = separator;
        }
    }
    Some(active.label.clone())
}
