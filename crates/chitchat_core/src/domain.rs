//! crates/chitchat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database schema; serde derives exist
//! only so rosters can be fingerprinted and shown to the reasoning provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Maximum number of displayable characters in a friend's name.
pub const MAX_FRIEND_NAME_CHARS: usize = 12;

/// An encrypted value together with the IV and GCM tag needed to open it.
/// All three parts are hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedField {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub persona: String,
    pub about: String,
    pub knowledge_base: String,
    pub encrypted_name: Option<SealedField>,
    pub encrypted_email: Option<SealedField>,
    pub email_hash: Option<String>,
    pub encryption_salt: Option<String>,
    /// Hex-encoded derived key. Stored next to the ciphertext it protects.
    pub encryption_key: Option<String>,
    pub todays_summary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields needed to insert a user row. Ids and timestamps are assigned
/// by the database adapter.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: Option<String>,
    pub persona: String,
    pub about: String,
    pub knowledge_base: String,
    pub encrypted_name: Option<SealedField>,
    pub encrypted_email: Option<SealedField>,
    pub email_hash: Option<String>,
    pub encryption_salt: Option<String>,
    pub encryption_key: Option<String>,
}

impl NewUser {
    /// The record created lazily for a visitor without a session or local id.
    pub fn guest() -> Self {
        Self {
            name: Some("New User".to_string()),
            persona: "Friendly".to_string(),
            about: "chatting".to_string(),
            knowledge_base: "Basic knowledge".to_string(),
            encrypted_name: None,
            encrypted_email: None,
            email_hash: None,
            encryption_salt: None,
            encryption_key: None,
        }
    }
}

/// A user's identity after any encrypted fields have been opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub persona: String,
    pub about: String,
    pub knowledge_base: String,
}

/// A configured simulated participant in the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiFriend {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub persona: String,
    pub about: String,
    pub knowledge_base: String,
    /// Active flag. Only active friends are eligible for routing.
    pub status: bool,
    pub avatar_id: Option<Uuid>,
}

/// The editable part of an AI friend, as submitted by the editor form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendDraft {
    pub name: String,
    pub persona: String,
    pub about: String,
    pub knowledge_base: String,
    pub status: bool,
    pub avatar_id: Option<Uuid>,
}

impl FriendDraft {
    /// Applies the editor's name limit by keeping the first twelve characters.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().chars().take(MAX_FRIEND_NAME_CHARS).collect();
        self
    }
}

/// A single chat line as shown in the thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A gallery entry that can be turned into an AI friend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvatarItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub creator: String,
    pub description: String,
    pub image_url: String,
    pub interactions: i64,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_featured: bool,
    pub is_favorite: bool,
    pub is_creator: bool,
    /// Set when an active friend of the viewer already uses this avatar.
    pub is_in_use: bool,
    pub has_ai_friend: bool,
}

/// The changes a creator may make to their own avatar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AvatarUpdate {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub is_public: bool,
}

impl AvatarItem {
    /// Builds the friend draft used when the avatar is adopted.
    pub fn to_friend_draft(&self) -> FriendDraft {
        FriendDraft {
            name: self.name.clone(),
            persona: self.description.clone(),
            about: self.tags.join(", "),
            knowledge_base: "Basic knowledge".to_string(),
            status: true,
            avatar_id: Some(self.id),
        }
        .normalized()
    }
}

//=========================================================================================
// Roster
//=========================================================================================

/// The ordered set of AI friends attached to a user's chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    friends: Vec<AiFriend>,
}

impl Roster {
    pub fn new(friends: Vec<AiFriend>) -> Self {
        Self { friends }
    }

    pub fn friends(&self) -> &[AiFriend] {
        &self.friends
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    /// Friends whose status flag is set, in roster order.
    pub fn active(&self) -> Vec<&AiFriend> {
        self.friends.iter().filter(|f| f.status).collect()
    }

    pub fn all_active(&self) -> bool {
        self.friends.iter().all(|f| f.status)
    }

    /// A content hash identifying this exact roster.
    ///
    /// Struct fields serialize in declaration order, so two rosters with the
    /// same friends in the same order always hash the same.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for friend in &self.friends {
            // Serializing a plain struct of strings cannot fail.
            let encoded = serde_json::to_vec(friend).unwrap_or_default();
            hasher.update((encoded.len() as u64).to_be_bytes());
            hasher.update(&encoded);
        }
        hex::encode(hasher.finalize())
    }
}

impl From<Vec<AiFriend>> for Roster {
    fn from(friends: Vec<AiFriend>) -> Self {
        Self::new(friends)
    }
}
