//! Per-view profile cache and avatar badges.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::chat::error::ChatError;
use crate::chat::identity::Identity;
use crate::chat::types::{UserId, UserProfileSummary};

/// What the UI needs to draw a participant's avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderBadge {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub initials: String,
}

/// Up to two upper-case letters: the first letters of the first two words of
/// the display name, else of the e-mail local part, else of the user id.
pub fn initials(profile: Option<&UserProfileSummary>, user_id: &UserId) -> String {
    let display_name = profile
        .and_then(|p| p.display_name.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let email_local = profile
        .and_then(|p| p.email.as_deref())
        .and_then(|email| email.split('@').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let source = display_name
        .or(email_local)
        .or_else(|| Some(user_id.as_str().trim()).filter(|s| !s.is_empty()));

    let Some(source) = source else {
        return "?".to_string();
    };

    let letters: String = source
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .collect();
    if letters.is_empty() {
        source.chars().take(2).collect::<String>().to_uppercase()
    } else {
        letters.to_uppercase()
    }
}

/// Profiles fetched during one view session.
///
/// A missing profile is cached as empty so it is not looked up again; a failed
/// lookup is forgotten so the next snapshot retries it.
#[derive(Debug, Default)]
pub(crate) struct ProfileCache {
    profiles: HashMap<UserId, UserProfileSummary>,
    in_flight: HashSet<UserId>,
}

impl ProfileCache {
    /// Ids that are neither cached nor being fetched. They are marked in flight.
    pub(crate) fn claim_missing<'a>(
        &mut self,
        user_ids: impl IntoIterator<Item = &'a UserId>,
    ) -> Vec<UserId> {
        let mut claimed = Vec::new();
        for user_id in user_ids {
            if self.profiles.contains_key(user_id) || self.in_flight.contains(user_id) {
                continue;
            }
            self.in_flight.insert(user_id.clone());
            claimed.push(user_id.clone());
        }
        claimed
    }

    /// Applies a lookup result. Returns true when the cache changed.
    pub(crate) fn resolve(
        &mut self,
        user_id: UserId,
        result: Result<Option<UserProfileSummary>, ChatError>,
    ) -> bool {
        self.in_flight.remove(&user_id);
        match result {
            Ok(profile) => {
                self.profiles.insert(user_id, profile.unwrap_or_default());
                true
            }
            Err(e) => {
                tracing::debug!(
                    target: "jobchat::conversation_view::profiles",
                    "Profile lookup for {} failed, using initials: {}",
                    user_id,
                    e
                );
                false
            }
        }
    }

    pub(crate) fn get(&self, user_id: &UserId) -> Option<&UserProfileSummary> {
        self.profiles.get(user_id)
    }

    /// Badge for `user_id`. The viewer's own badge comes from the identity,
    /// everyone else's from the cache.
    pub(crate) fn badge(&self, user_id: &UserId, identity: &Identity) -> SenderBadge {
        let own;
        let profile = if identity.is_mine(user_id) {
            own = identity.profile_summary();
            own.as_ref()
        } else {
            self.get(user_id)
        };

        SenderBadge {
            user_id: user_id.clone(),
            display_name: profile.and_then(|p| p.display_name.clone()),
            avatar_url: profile.and_then(|p| p.avatar_url.clone()),
            initials: initials(profile, user_id),
        }
    }
}
