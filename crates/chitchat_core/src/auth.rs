//! crates/chitchat_core/src/auth.rs
//!
//! The username + email sign-in flow. An unknown email registers a new user
//! with encrypted identity fields; a known email is verified by re-deriving
//! the key and opening the stored name.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::crypto::{self, CryptoError};
use crate::domain::{NewUser, User};
use crate::ports::{DatabaseService, PortError};
use crate::sanitize::{validate_credentials, Credentials, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Deliberately does not say whether the username or the email was wrong.
    #[error("Invalid username or email combination")]
    InvalidCombination,
    #[error("Email already in use")]
    EmailInUse,
    #[error("Encryption failure: {0}")]
    Crypto(CryptoError),
    #[error(transparent)]
    Port(PortError),
}

/// The result of a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub user_id: Uuid,
    pub created: bool,
}

pub struct AuthService {
    db: Arc<dyn DatabaseService>,
}

impl AuthService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Signs an existing user in, or registers them if the email is unknown.
    pub async fn sign_in_or_register(
        &self,
        username: &str,
        email: &str,
    ) -> Result<AuthOutcome, AuthError> {
        let credentials = validate_credentials(username, email)?;
        let email_hash = crypto::hash_email(&credentials.email);

        let existing = self
            .db
            .find_user_by_email_hash(&email_hash)
            .await
            .map_err(AuthError::Port)?;

        match existing {
            Some(user) => {
                verify_existing(&user, &credentials)?;
                info!("User {} signed in.", user.id);
                Ok(AuthOutcome {
                    user_id: user.id,
                    created: false,
                })
            }
            None => {
                let user = self.register(&credentials, email_hash).await?;
                info!("Registered new user {}.", user.id);
                Ok(AuthOutcome {
                    user_id: user.id,
                    created: true,
                })
            }
        }
    }

    async fn register(&self, credentials: &Credentials, email_hash: String) -> Result<User, AuthError> {
        let salt = crypto::generate_salt();
        let key = crypto::generate_encryption_key(&credentials.key_material(), &salt)
            .map_err(AuthError::Crypto)?;
        let encrypted_name = crypto::encrypt(&credentials.username, &key).map_err(AuthError::Crypto)?;
        let encrypted_email = crypto::encrypt(&credentials.email, &key).map_err(AuthError::Crypto)?;

        let new_user = NewUser {
            name: None,
            persona: "Enthusiastic and Friendly".to_string(),
            about: "New user".to_string(),
            knowledge_base: "Basic knowledge".to_string(),
            encrypted_name: Some(encrypted_name),
            encrypted_email: Some(encrypted_email),
            email_hash: Some(email_hash),
            encryption_salt: Some(salt),
            encryption_key: Some(key.to_hex()),
        };

        self.db.create_user(new_user).await.map_err(|e| match e {
            PortError::Conflict(_) => AuthError::EmailInUse,
            other => {
                error!("Failed to create user: {:?}", other);
                AuthError::Port(other)
            }
        })
    }
}

fn verify_existing(user: &User, credentials: &Credentials) -> Result<(), AuthError> {
    let (Some(salt), Some(sealed_name)) = (&user.encryption_salt, &user.encrypted_name) else {
        warn!("User {} has no encrypted identity to verify against.", user.id);
        return Err(AuthError::InvalidCombination);
    };

    let key = crypto::generate_encryption_key(&credentials.key_material(), salt)
        .map_err(AuthError::Crypto)?;

    match crypto::decrypt(sealed_name, &key) {
        Ok(name) if name == credentials.username => Ok(()),
        Ok(_) => {
            warn!("Sign-in rejected for user {}: name mismatch.", user.id);
            Err(AuthError::InvalidCombination)
        }
        Err(e) => {
            warn!("Sign-in rejected for user {}: {}", user.id, e);
            Err(AuthError::InvalidCombination)
        }
    }
}
