//! Who can see which meme.
//!
//! Every community-facing query (feeds, likes, reviews, trending, the
//! premium catalogue) goes through [`is_community_visible`].

use crate::models::{Meme, ModerationStatus, User};
use std::collections::HashMap;
use uuid::Uuid;

/// A meme is visible to the community when it is public and not hidden, and
/// its creator has a public profile and is not blocked.
pub fn is_community_visible(meme: &Meme, owner: Option<&User>) -> bool {
    let Some(owner) = owner else {
        return false;
    };
    meme.is_public
        && meme.moderation == ModerationStatus::Active
        && owner.user_id == meme.creator_id
        && owner.is_public
        && !owner.is_blocked
}

/// What the caller is allowed to do with a single meme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemeAccess {
    pub can_view: bool,
    pub can_see_image: bool,
}

/// Resolves access for `viewer`. Owners and moderators always see everything;
/// premium images are reserved for buyers.
pub fn meme_access(
    meme: &Meme,
    owner: Option<&User>,
    viewer: Option<Uuid>,
    viewer_moderates: bool,
    viewer_purchased: bool,
) -> MemeAccess {
    let is_owner = viewer == Some(meme.creator_id);
    if is_owner || viewer_moderates {
        return MemeAccess { can_view: true, can_see_image: true };
    }
    let can_view = is_community_visible(meme, owner);
    MemeAccess {
        can_view,
        can_see_image: can_view && (!meme.is_premium || viewer_purchased),
    }
}

/// Users keyed by id, for filtering many memes against their owners.
#[derive(Debug, Default)]
pub struct OwnerIndex {
    users: HashMap<Uuid, User>,
}

impl OwnerIndex {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.user_id, u)).collect(),
        }
    }

    pub fn get(&self, user_id: &Uuid) -> Option<&User> {
        self.users.get(user_id)
    }

    pub fn is_visible(&self, meme: &Meme) -> bool {
        is_community_visible(meme, self.get(&meme.creator_id))
    }

    /// Keeps only the memes the community may see.
    pub fn visible(&self, memes: Vec<Meme>) -> Vec<Meme> {
        memes.into_iter().filter(|m| self.is_visible(m)).collect()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }
}
