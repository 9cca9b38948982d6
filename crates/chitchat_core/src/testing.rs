//! In-memory fakes of the ports, shared by the unit tests of this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{AiFriend, AvatarItem, AvatarUpdate, FriendDraft, NewUser, User};
use crate::ports::{
    DatabaseService, OutputSchema, PortError, PortResult, Prompt, ReasoningService,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, Uuid>,
    friends: Vec<AiFriend>,
    avatars: Vec<AvatarItem>,
}

#[derive(Default)]
pub struct InMemoryDb {
    tables: Mutex<Tables>,
    pub fail_writes: std::sync::atomic::AtomicBool,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.tables.lock().unwrap().users.insert(user.id, user);
    }

    pub fn insert_avatar(&self, avatar: AvatarItem) {
        self.tables.lock().unwrap().avatars.push(avatar);
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.tables.lock().unwrap().users.get(&id).cloned()
    }

    fn check_writes(&self) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("database unavailable".to_string()));
        }
        Ok(())
    }

    fn friend_mut<'a>(
        tables: &'a mut Tables,
        user_id: Uuid,
        friend_id: Uuid,
    ) -> PortResult<&'a mut AiFriend> {
        tables
            .friends
            .iter_mut()
            .find(|f| f.id == friend_id && f.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Friend {} not found", friend_id)))
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        self.check_writes()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(hash) = &new_user.email_hash {
            if tables.users.values().any(|u| u.email_hash.as_ref() == Some(hash)) {
                return Err(PortError::Conflict("email_hash".to_string()));
            }
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            persona: new_user.persona,
            about: new_user.about,
            knowledge_base: new_user.knowledge_base,
            encrypted_name: new_user.encrypted_name,
            encrypted_email: new_user.encrypted_email,
            email_hash: new_user.email_hash,
            encryption_salt: new_user.encryption_salt,
            encryption_key: new_user.encryption_key,
            todays_summary: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.user(user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn find_user_by_email_hash(&self, email_hash: &str) -> PortResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .values()
            .find(|u| u.email_hash.as_deref() == Some(email_hash))
            .cloned())
    }

    async fn update_user_profile(
        &self,
        user_id: Uuid,
        persona: &str,
        about: &str,
        knowledge_base: &str,
    ) -> PortResult<User> {
        self.check_writes()?;
        let mut tables = self.tables.lock().unwrap();
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        user.persona = persona.to_string();
        user.about = about.to_string();
        user.knowledge_base = knowledge_base.to_string();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn clear_todays_summary_flags(&self) -> PortResult<u64> {
        self.check_writes()?;
        let mut tables = self.tables.lock().unwrap();
        let mut count = 0;
        for user in tables.users.values_mut().filter(|u| u.todays_summary) {
            user.todays_summary = false;
            count += 1;
        }
        Ok(count)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        _expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.check_writes()?;
        self.tables
            .lock()
            .unwrap()
            .sessions
            .insert(session_id.to_string(), user_id);
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        self.tables
            .lock()
            .unwrap()
            .sessions
            .get(session_id)
            .copied()
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.lock().unwrap().sessions.remove(session_id);
        Ok(())
    }

    async fn list_friends(&self, user_id: Uuid) -> PortResult<Vec<AiFriend>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .friends
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_friend(&self, user_id: Uuid, draft: FriendDraft) -> PortResult<AiFriend> {
        self.check_writes()?;
        let friend = AiFriend {
            id: Uuid::new_v4(),
            user_id,
            name: draft.name,
            persona: draft.persona,
            about: draft.about,
            knowledge_base: draft.knowledge_base,
            status: draft.status,
            avatar_id: draft.avatar_id,
        };
        self.tables.lock().unwrap().friends.push(friend.clone());
        Ok(friend)
    }

    async fn update_friend(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
        draft: FriendDraft,
    ) -> PortResult<AiFriend> {
        self.check_writes()?;
        let mut tables = self.tables.lock().unwrap();
        let friend = Self::friend_mut(&mut tables, user_id, friend_id)?;
        friend.name = draft.name;
        friend.persona = draft.persona;
        friend.about = draft.about;
        friend.knowledge_base = draft.knowledge_base;
        friend.status = draft.status;
        friend.avatar_id = draft.avatar_id;
        Ok(friend.clone())
    }

    async fn set_friend_status(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
        status: bool,
    ) -> PortResult<AiFriend> {
        self.check_writes()?;
        let mut tables = self.tables.lock().unwrap();
        let friend = Self::friend_mut(&mut tables, user_id, friend_id)?;
        friend.status = status;
        Ok(friend.clone())
    }

    async fn list_avatars(&self, viewer_id: Uuid) -> PortResult<Vec<AvatarItem>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .avatars
            .iter()
            .filter(|a| a.is_public || a.user_id == viewer_id)
            .map(|a| {
                let mut item = a.clone();
                item.is_creator = a.user_id == viewer_id;
                item.is_in_use = tables.friends.iter().any(|f| {
                    f.user_id == viewer_id && f.status && f.avatar_id == Some(a.id)
                });
                item.has_ai_friend = tables
                    .friends
                    .iter()
                    .any(|f| f.user_id == viewer_id && f.avatar_id == Some(a.id));
                item
            })
            .collect())
    }

    async fn get_avatar(&self, viewer_id: Uuid, avatar_id: Uuid) -> PortResult<AvatarItem> {
        self.list_avatars(viewer_id)
            .await?
            .into_iter()
            .find(|a| a.id == avatar_id)
            .ok_or_else(|| PortError::NotFound(format!("Avatar {} not found", avatar_id)))
    }

    async fn update_avatar(
        &self,
        user_id: Uuid,
        avatar_id: Uuid,
        update: AvatarUpdate,
    ) -> PortResult<AvatarItem> {
        self.check_writes()?;
        {
            let mut tables = self.tables.lock().unwrap();
            let avatar = tables
                .avatars
                .iter_mut()
                .find(|a| a.id == avatar_id && a.user_id == user_id)
                .ok_or_else(|| PortError::NotFound(format!("Avatar {} not found", avatar_id)))?;
            avatar.name = update.name;
            avatar.description = update.description;
            avatar.tags = update.tags;
            avatar.is_public = update.is_public;
        }
        self.get_avatar(user_id, avatar_id).await
    }
}

//=========================================================================================
// Scripted reasoning provider
//=========================================================================================

/// One scripted reply of a fake reasoning provider.
pub enum Reply {
    Json(Value),
    Text(String),
    Fail,
    Hang,
}

/// Plays back queued replies and counts calls. An empty queue behaves like `Fail`.
#[derive(Default)]
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    pub last_prompt: Mutex<Option<Prompt>>,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self, prompt: &Prompt) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.clone());
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Fail);
        if let Reply::Hang = reply {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        reply
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn complete_structured(&self, prompt: &Prompt, _schema: &OutputSchema) -> PortResult<Value> {
        match self.next(prompt).await {
            Reply::Json(value) => Ok(value),
            Reply::Text(text) => serde_json::from_str(&text)
                .map_err(|e| PortError::Unexpected(e.to_string())),
            Reply::Fail | Reply::Hang => {
                Err(PortError::Unexpected("provider unavailable".to_string()))
            }
        }
    }

    async fn complete(&self, prompt: &Prompt) -> PortResult<String> {
        match self.next(prompt).await {
            Reply::Text(text) => Ok(text),
            Reply::Json(value) => Ok(value.to_string()),
            Reply::Fail | Reply::Hang => {
                Err(PortError::Unexpected("provider unavailable".to_string()))
            }
        }
    }
}
