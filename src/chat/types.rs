use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a conversation. Equal to the id of the job application it belongs to.
    ConversationId
);
string_id!(
    /// Identifier of a signed-in user as issued by the authentication provider.
    UserId
);
string_id!(MessageId);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// A single chat message. Immutable once the store has accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub text: String,
    /// Server-assigned; strictly increasing within a conversation.
    pub sent_at: DateTime<Utc>,
}

/// Conversation record with the denormalized last-message metadata used by
/// the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_sender_id: Option<UserId>,
}

impl Conversation {
    pub fn new(id: ConversationId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            last_message_at: None,
            last_sender_id: None,
        }
    }

    /// True when someone other than `viewer` sent the most recent message.
    ///
    /// An anonymous viewer (`None`) never owns a message, so any recorded
    /// sender counts as unread.
    pub fn has_unread_for(&self, viewer: Option<&UserId>) -> bool {
        match (&self.last_sender_id, viewer) {
            (Some(sender), Some(viewer)) => sender != viewer,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Per-(conversation, user) presence hint, overwritten in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub user_id: UserId,
    pub is_typing: bool,
    pub updated_at: DateTime<Utc>,
}

/// Read-only profile data used for avatars and initials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileSummary {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserProfileSummary {
    pub fn new(
        display_name: Option<String>,
        email: Option<String>,
        avatar_url: Option<String>,
    ) -> Self {
        Self {
            display_name: display_name.filter(|s| !s.trim().is_empty()),
            email: email.filter(|s| !s.trim().is_empty()),
            avatar_url: avatar_url.filter(|s| !s.trim().is_empty()),
        }
    }
}
