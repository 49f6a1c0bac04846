use serde::{Deserialize, Serialize};

use crate::chat::types::{UserId, UserProfileSummary};

/// The signed-in user as reported by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl CurrentUser {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: None,
            avatar_url: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// Who is looking at a conversation.
///
/// Passed into every view explicitly. `Anonymous` owns no messages, performs
/// no message or typing writes and gets placeholder data for every lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    #[default]
    Anonymous,
    SignedIn(CurrentUser),
}

impl Identity {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Identity::Anonymous => None,
            Identity::SignedIn(user) => Some(&user.id),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, Identity::SignedIn(_))
    }

    pub fn is_mine(&self, sender_id: &UserId) -> bool {
        self.user_id() == Some(sender_id)
    }

    /// The viewer's own profile, taken from the auth provider rather than the store.
    pub fn profile_summary(&self) -> Option<UserProfileSummary> {
        match self {
            Identity::Anonymous => None,
            Identity::SignedIn(user) => Some(UserProfileSummary::new(
                user.display_name.clone(),
                user.email.clone(),
                user.avatar_url.clone(),
            )),
        }
    }
}

impl From<CurrentUser> for Identity {
    fn from(user: CurrentUser) -> Self {
        Identity::SignedIn(user)
    }
}
