//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, plus the
//! status-code mapping handlers use for core errors.

use crate::config::ConfigError;
use axum::http::StatusCode;
use chitchat_core::auth::AuthError;
use chitchat_core::friends::FriendError;
use chitchat_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The response body used for every unexpected failure.
pub const INTERNAL_MESSAGE: &str = "An unexpected error occurred";

pub fn port_rejection(e: &PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, what.clone()),
        PortError::Conflict(what) => (StatusCode::CONFLICT, what.clone()),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, INTERNAL_MESSAGE.to_string()),
        PortError::Unexpected(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()),
    }
}

pub fn auth_rejection(e: &AuthError) -> (StatusCode, String) {
    match e {
        AuthError::Validation(v) => (StatusCode::BAD_REQUEST, v.to_string()),
        AuthError::InvalidCombination => (StatusCode::UNAUTHORIZED, e.to_string()),
        AuthError::EmailInUse => (StatusCode::CONFLICT, e.to_string()),
        AuthError::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()),
        AuthError::Port(p) => port_rejection(p),
    }
}

pub fn friend_rejection(e: &FriendError) -> (StatusCode, String) {
    match e {
        FriendError::EmptyName => (StatusCode::BAD_REQUEST, e.to_string()),
        FriendError::AvatarInUse => (StatusCode::CONFLICT, e.to_string()),
        FriendError::Port(p) => port_rejection(p),
    }
}
