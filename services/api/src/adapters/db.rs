//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chitchat_core::domain::{AiFriend, AvatarItem, AvatarUpdate, FriendDraft, NewUser, SealedField, User};
use chitchat_core::ports::{DatabaseService, PortError, PortResult};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Maps driver errors onto the port taxonomy. Unique violations become `Conflict`.
fn db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("Row not found".to_string()),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            PortError::Conflict(db_err.message().to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

fn sealed(ciphertext: Option<String>, iv: Option<String>, tag: Option<String>) -> Option<SealedField> {
    match (ciphertext, iv, tag) {
        (Some(ciphertext), Some(iv), Some(tag)) => Some(SealedField { ciphertext, iv, tag }),
        _ => None,
    }
}

fn unsealed(field: Option<SealedField>) -> (Option<String>, Option<String>, Option<String>) {
    match field {
        Some(f) => (Some(f.ciphertext), Some(f.iv), Some(f.tag)),
        None => (None, None, None),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, name, persona, about, knowledge_base, \
    encrypted_name, name_iv, name_tag, encrypted_email, email_iv, email_tag, \
    email_hash, encryption_salt, encryption_key, todays_summary, created_at, updated_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: Option<String>,
    persona: String,
    about: String,
    knowledge_base: String,
    encrypted_name: Option<String>,
    name_iv: Option<String>,
    name_tag: Option<String>,
    encrypted_email: Option<String>,
    email_iv: Option<String>,
    email_tag: Option<String>,
    email_hash: Option<String>,
    encryption_salt: Option<String>,
    encryption_key: Option<String>,
    todays_summary: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            persona: self.persona,
            about: self.about,
            knowledge_base: self.knowledge_base,
            encrypted_name: sealed(self.encrypted_name, self.name_iv, self.name_tag),
            encrypted_email: sealed(self.encrypted_email, self.email_iv, self.email_tag),
            email_hash: self.email_hash,
            encryption_salt: self.encryption_salt,
            encryption_key: self.encryption_key,
            todays_summary: self.todays_summary,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const FRIEND_COLUMNS: &str = "id, user_id, name, persona, about, knowledge_base, status, avatar_id";

#[derive(FromRow)]
struct FriendRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    persona: String,
    about: String,
    knowledge_base: String,
    status: bool,
    avatar_id: Option<Uuid>,
}
impl FriendRecord {
    fn to_domain(self) -> AiFriend {
        AiFriend {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            persona: self.persona,
            about: self.about,
            knowledge_base: self.knowledge_base,
            status: self.status,
            avatar_id: self.avatar_id,
        }
    }
}

/// Avatars as seen by one viewer (`$1`), with the per-viewer flags computed in SQL.
const AVATAR_SELECT: &str = "SELECT a.id, a.user_id, a.name, a.creator, a.description, a.image_url, \
    a.interactions, a.tags, a.is_public, a.is_featured, \
    EXISTS (SELECT 1 FROM avatar_favorites fav WHERE fav.avatar_id = a.id AND fav.user_id = $1) AS is_favorite, \
    (a.user_id = $1) AS is_creator, \
    EXISTS (SELECT 1 FROM ai_friends f WHERE f.avatar_id = a.id AND f.user_id = $1 AND f.status) AS is_in_use, \
    EXISTS (SELECT 1 FROM ai_friends f WHERE f.avatar_id = a.id AND f.user_id = $1) AS has_ai_friend \
    FROM avatars a";

#[derive(FromRow)]
struct AvatarRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    creator: String,
    description: String,
    image_url: String,
    interactions: i64,
    tags: Vec<String>,
    is_public: bool,
    is_featured: bool,
    is_favorite: bool,
    is_creator: bool,
    is_in_use: bool,
    has_ai_friend: bool,
}
impl AvatarRecord {
    fn to_domain(self) -> AvatarItem {
        AvatarItem {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            creator: self.creator,
            description: self.description,
            image_url: self.image_url,
            interactions: self.interactions,
            tags: self.tags,
            is_public: self.is_public,
            is_featured: self.is_featured,
            is_favorite: self.is_favorite,
            is_creator: self.is_creator,
            is_in_use: self.is_in_use,
            has_ai_friend: self.has_ai_friend,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let (encrypted_name, name_iv, name_tag) = unsealed(new_user.encrypted_name);
        let (encrypted_email, email_iv, email_tag) = unsealed(new_user.encrypted_email);

        let sql = format!(
            "INSERT INTO users (id, name, persona, about, knowledge_base, \
                encrypted_name, name_iv, name_tag, encrypted_email, email_iv, email_tag, \
                email_hash, encryption_salt, encryption_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_user.name)
            .bind(new_user.persona)
            .bind(new_user.about)
            .bind(new_user.knowledge_base)
            .bind(encrypted_name)
            .bind(name_iv)
            .bind(name_tag)
            .bind(encrypted_email)
            .bind(email_iv)
            .bind(email_tag)
            .bind(new_user.email_hash)
            .bind(new_user.encryption_salt)
            .bind(new_user.encryption_key)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn find_user_by_email_hash(&self, email_hash: &str) -> PortResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email_hash = $1");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn update_user_profile(
        &self,
        user_id: Uuid,
        persona: &str,
        about: &str,
        knowledge_base: &str,
    ) -> PortResult<User> {
        let sql = format!(
            "UPDATE users SET persona = $2, about = $3, knowledge_base = $4, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(persona)
            .bind(about)
            .bind(knowledge_base)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn clear_todays_summary_flags(&self) -> PortResult<u64> {
        let result = sqlx::query("UPDATE users SET todays_summary = FALSE WHERE todays_summary = TRUE")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    // --- Auth Methods ---

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (session_id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE session_id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|(user_id,)| user_id).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    // --- AI Friends ---

    async fn list_friends(&self, user_id: Uuid) -> PortResult<Vec<AiFriend>> {
        let sql = format!("SELECT {FRIEND_COLUMNS} FROM ai_friends WHERE user_id = $1 ORDER BY created_at ASC");
        let records = sqlx::query_as::<_, FriendRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(FriendRecord::to_domain).collect())
    }

    async fn create_friend(&self, user_id: Uuid, draft: FriendDraft) -> PortResult<AiFriend> {
        let sql = format!(
            "INSERT INTO ai_friends (id, user_id, name, persona, about, knowledge_base, status, avatar_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {FRIEND_COLUMNS}"
        );
        let record = sqlx::query_as::<_, FriendRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(draft.name)
            .bind(draft.persona)
            .bind(draft.about)
            .bind(draft.knowledge_base)
            .bind(draft.status)
            .bind(draft.avatar_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.to_domain())
    }

    async fn update_friend(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
        draft: FriendDraft,
    ) -> PortResult<AiFriend> {
        let sql = format!(
            "UPDATE ai_friends SET name = $3, persona = $4, about = $5, knowledge_base = $6, \
                status = $7, avatar_id = $8 \
             WHERE id = $1 AND user_id = $2 RETURNING {FRIEND_COLUMNS}"
        );
        let record = sqlx::query_as::<_, FriendRecord>(&sql)
            .bind(friend_id)
            .bind(user_id)
            .bind(draft.name)
            .bind(draft.persona)
            .bind(draft.about)
            .bind(draft.knowledge_base)
            .bind(draft.status)
            .bind(draft.avatar_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("AI friend {} not found", friend_id)))?;
        Ok(record.to_domain())
    }

    async fn set_friend_status(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
        status: bool,
    ) -> PortResult<AiFriend> {
        let sql = format!(
            "UPDATE ai_friends SET status = $3 WHERE id = $1 AND user_id = $2 RETURNING {FRIEND_COLUMNS}"
        );
        let record = sqlx::query_as::<_, FriendRecord>(&sql)
            .bind(friend_id)
            .bind(user_id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("AI friend {} not found", friend_id)))?;
        Ok(record.to_domain())
    }

    // --- Avatar Gallery ---

    async fn list_avatars(&self, viewer_id: Uuid) -> PortResult<Vec<AvatarItem>> {
        let sql = format!(
            "{AVATAR_SELECT} WHERE a.is_public OR a.user_id = $1 \
             ORDER BY a.is_featured DESC, a.interactions DESC, a.created_at DESC"
        );
        let records = sqlx::query_as::<_, AvatarRecord>(&sql)
            .bind(viewer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(AvatarRecord::to_domain).collect())
    }

    async fn get_avatar(&self, viewer_id: Uuid, avatar_id: Uuid) -> PortResult<AvatarItem> {
        let sql = format!("{AVATAR_SELECT} WHERE a.id = $2 AND (a.is_public OR a.user_id = $1)");
        let record = sqlx::query_as::<_, AvatarRecord>(&sql)
            .bind(viewer_id)
            .bind(avatar_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("Avatar {} not found", avatar_id)))?;
        Ok(record.to_domain())
    }

    async fn update_avatar(
        &self,
        user_id: Uuid,
        avatar_id: Uuid,
        update: AvatarUpdate,
    ) -> PortResult<AvatarItem> {
        let result = sqlx::query(
            "UPDATE avatars SET name = $3, description = $4, tags = $5, is_public = $6 \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(avatar_id)
        .bind(user_id)
        .bind(update.name)
        .bind(update.description)
        .bind(update.tags)
        .bind(update.is_public)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Avatar {} not found", avatar_id)));
        }
        self.get_avatar(user_id, avatar_id).await
    }
}
