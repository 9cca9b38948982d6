//! crates/chitchat_core/src/sanitize.rs
//!
//! Normalizes and validates the username/email pair before any key derivation
//! or database lookup happens.

use regex::Regex;
use std::sync::OnceLock;

const MAX_USERNAME_CHARS: usize = 50;
const MAX_EMAIL_CHARS: usize = 254;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Username must be at most {MAX_USERNAME_CHARS} characters")]
    UsernameTooLong,
}

/// A sanitized, validated username/email pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub email: String,
}

impl Credentials {
    /// The secret material keys are derived from.
    pub fn key_material(&self) -> String {
        format!("{}{}", self.email, self.username)
    }
}

/// Trims the input and strips control characters and markup-significant characters.
pub fn sanitize_input(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | '"' | '\'' | '`'))
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn normalize_email(raw: &str) -> String {
    sanitize_input(&raw.trim().to_lowercase())
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

pub fn validate_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_CHARS && email_regex().is_match(email)
}

/// Sanitizes both fields and checks them, in the order the sign-in form reports problems.
pub fn validate_credentials(username: &str, email: &str) -> Result<Credentials, ValidationError> {
    let username = sanitize_input(username);
    let email = normalize_email(email);

    if username.is_empty() || email.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    if !validate_email(&email) {
        return Err(ValidationError::InvalidEmail);
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ValidationError::UsernameTooLong);
    }
    Ok(Credentials { username, email })
}
