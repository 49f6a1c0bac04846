//! Snapshot streaming
//!
//! Live feeds for a conversation. Every update carries the complete current
//! state of the feed, so a subscriber can always re-render from the latest
//! value alone and never has to merge deltas.

mod manager;
mod types;

pub use manager::SnapshotStreamManager;
pub use types::{MessageSnapshot, Subscription, TypingSnapshot};
