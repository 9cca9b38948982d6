//! crates/chitchat_core/src/friends.rs
//!
//! Editing the roster. Every successful write drops the cached roster
//! summary before returning, so the next summary read cannot be stale.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{AiFriend, FriendDraft};
use crate::ports::{DatabaseService, PortError};
use crate::summary::SummaryCache;

#[derive(Debug, thiserror::Error)]
pub enum FriendError {
    #[error("Friend name must not be empty")]
    EmptyName,
    #[error("This avatar is already in use")]
    AvatarInUse,
    #[error(transparent)]
    Port(#[from] PortError),
}

pub struct FriendService {
    db: Arc<dyn DatabaseService>,
    summaries: SummaryCache,
}

impl FriendService {
    pub fn new(db: Arc<dyn DatabaseService>, summaries: SummaryCache) -> Self {
        Self { db, summaries }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<AiFriend>, FriendError> {
        Ok(self.db.list_friends(user_id).await?)
    }

    pub async fn create_friend(&self, user_id: Uuid, draft: FriendDraft) -> Result<AiFriend, FriendError> {
        let draft = checked(draft)?;
        if draft.status {
            self.ensure_avatar_free(user_id, draft.avatar_id, None).await?;
        }
        let friend = self.db.create_friend(user_id, draft).await?;
        self.invalidate_summary(user_id);
        info!("Created AI friend {} for user {}", friend.id, user_id);
        Ok(friend)
    }

    pub async fn update_friend(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
        draft: FriendDraft,
    ) -> Result<AiFriend, FriendError> {
        let draft = checked(draft)?;
        if draft.status {
            self.ensure_avatar_free(user_id, draft.avatar_id, Some(friend_id)).await?;
        }
        let friend = self.db.update_friend(user_id, friend_id, draft).await?;
        self.invalidate_summary(user_id);
        info!("Updated AI friend {} for user {}", friend_id, user_id);
        Ok(friend)
    }

    pub async fn set_status(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
        status: bool,
    ) -> Result<AiFriend, FriendError> {
        if status {
            let roster = self.db.list_friends(user_id).await?;
            let avatar_id = roster
                .iter()
                .find(|f| f.id == friend_id)
                .and_then(|f| f.avatar_id);
            ensure_free(&roster, avatar_id, Some(friend_id))?;
        }
        let friend = self.db.set_friend_status(user_id, friend_id, status).await?;
        self.invalidate_summary(user_id);
        Ok(friend)
    }

    /// Turns a gallery avatar into an active AI friend of `user_id`.
    pub async fn adopt_avatar(&self, user_id: Uuid, avatar_id: Uuid) -> Result<AiFriend, FriendError> {
        let avatar = self.db.get_avatar(user_id, avatar_id).await?;
        if avatar.is_in_use {
            return Err(FriendError::AvatarInUse);
        }
        self.create_friend(user_id, avatar.to_friend_draft()).await
    }

    async fn ensure_avatar_free(
        &self,
        user_id: Uuid,
        avatar_id: Option<Uuid>,
        except: Option<Uuid>,
    ) -> Result<(), FriendError> {
        if avatar_id.is_none() {
            return Ok(());
        }
        let roster = self.db.list_friends(user_id).await?;
        ensure_free(&roster, avatar_id, except)
    }

    fn invalidate_summary(&self, user_id: Uuid) {
        if let Err(e) = self.summaries.scoped(user_id).invalidate() {
            warn!("Failed to invalidate roster summary for user {}: {}", user_id, e);
        }
    }
}

/// An avatar may back at most one active friend per user.
fn ensure_free(roster: &[AiFriend], avatar_id: Option<Uuid>, except: Option<Uuid>) -> Result<(), FriendError> {
    let Some(avatar_id) = avatar_id else {
        return Ok(());
    };
    let taken = roster
        .iter()
        .any(|f| f.status && f.avatar_id == Some(avatar_id) && Some(f.id) != except);
    if taken {
        return Err(FriendError::AvatarInUse);
    }
    Ok(())
}

fn checked(draft: FriendDraft) -> Result<FriendDraft, FriendError> {
    let draft = draft.normalized();
    if draft.name.trim().is_empty() {
        return Err(FriendError::EmptyName);
    }
    Ok(draft)
}
