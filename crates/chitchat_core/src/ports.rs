//! crates/chitchat_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{AiFriend, AvatarItem, AvatarUpdate, FriendDraft, NewUser, User};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Database
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn find_user_by_email_hash(&self, email_hash: &str) -> PortResult<Option<User>>;

    async fn update_user_profile(
        &self,
        user_id: Uuid,
        persona: &str,
        about: &str,
        knowledge_base: &str,
    ) -> PortResult<User>;

    /// Clears the daily-summary flag on every user that has it set.
    /// Returns the number of rows changed.
    async fn clear_todays_summary_flags(&self) -> PortResult<u64>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- AI Friends ---
    async fn list_friends(&self, user_id: Uuid) -> PortResult<Vec<AiFriend>>;

    async fn create_friend(&self, user_id: Uuid, draft: FriendDraft) -> PortResult<AiFriend>;

    async fn update_friend(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
        draft: FriendDraft,
    ) -> PortResult<AiFriend>;

    async fn set_friend_status(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
        status: bool,
    ) -> PortResult<AiFriend>;

    // --- Avatar Gallery ---
    /// Public avatars plus the viewer's own, with per-viewer flags filled in.
    async fn list_avatars(&self, viewer_id: Uuid) -> PortResult<Vec<AvatarItem>>;

    async fn get_avatar(&self, viewer_id: Uuid, avatar_id: Uuid) -> PortResult<AvatarItem>;

    async fn update_avatar(
        &self,
        user_id: Uuid,
        avatar_id: Uuid,
        update: AvatarUpdate,
    ) -> PortResult<AvatarItem>;
}

//=========================================================================================
// Reasoning Provider
//=========================================================================================

/// The instructions sent to a reasoning provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Errors raised when a structured-output schema is malformed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema root must be an object type")]
    RootNotObject,
    #[error("schema has no properties")]
    NoProperties,
    #[error("required field '{0}' is not declared in properties")]
    UndeclaredRequired(String),
    #[error("property '{0}' has no type")]
    UntypedProperty(String),
    #[error("array property '{0}' has no items")]
    ArrayWithoutItems(String),
}

/// A named JSON schema that a structured-output response must follow.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Checks the schema locally so malformed requests never leave the process.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(SchemaError::RootNotObject);
        }
        let properties = self
            .schema
            .get("properties")
            .and_then(Value::as_object)
            .filter(|p| !p.is_empty())
            .ok_or(SchemaError::NoProperties)?;

        for (name, property) in properties {
            match property.get("type").and_then(Value::as_str) {
                None => return Err(SchemaError::UntypedProperty(name.clone())),
                Some("array") if property.get("items").is_none() => {
                    return Err(SchemaError::ArrayWithoutItems(name.clone()))
                }
                Some(_) => {}
            }
        }

        if let Some(required) = self.schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !properties.contains_key(field) {
                    return Err(SchemaError::UndeclaredRequired(field.to_string()));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Asks for a response constrained to `schema` and returns the parsed JSON payload.
    async fn complete_structured(&self, prompt: &Prompt, schema: &OutputSchema) -> PortResult<Value>;

    /// Plain text completion.
    async fn complete(&self, prompt: &Prompt) -> PortResult<String>;
}

//=========================================================================================
// Local Key-Value Storage
//=========================================================================================

/// Small persistent string store standing in for browser local storage.
///
/// Calls are synchronous: a `remove` has taken effect when it returns.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PortResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> PortResult<()>;
    fn remove(&self, key: &str) -> PortResult<()>;
}

//=========================================================================================
// Remote Session
//=========================================================================================

/// A change of the remote authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: Uuid },
    SignedOut,
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Resolves the user behind a session token, if the session is live.
    async fn current_session(&self, token: Option<&str>) -> PortResult<Option<Uuid>>;

    async fn sign_out(&self, token: &str) -> PortResult<()>;

    /// Registers for session-change notifications. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_schema_validates() {
        let schema = OutputSchema::new(
            "respondingFriends",
            json!({
                "type": "object",
                "properties": { "friends": { "type": "array", "items": { "type": "string" } } },
                "required": ["friends"]
            }),
        );
        assert_eq!(schema.validate(), Ok(()));
    }

    #[test]
    fn malformed_schemas_are_rejected() {
        let not_object = OutputSchema::new("x", json!({ "type": "array" }));
        assert_eq!(not_object.validate(), Err(SchemaError::RootNotObject));

        let no_items = OutputSchema::new(
            "x",
            json!({ "type": "object", "properties": { "friends": { "type": "array" } } }),
        );
        assert_eq!(
            no_items.validate(),
            Err(SchemaError::ArrayWithoutItems("friends".to_string()))
        );

        let bad_required = OutputSchema::new(
            "x",
            json!({
                "type": "object",
                "properties": { "friends": { "type": "string" } },
                "required": ["names"]
            }),
        );
        assert_eq!(
            bad_required.validate(),
            Err(SchemaError::UndeclaredRequired("names".to_string()))
        );
    }
}
