//! crates/chitchat_core/src/presentation.rs
//!
//! Helpers behind the message list and the avatar gallery: resolving a
//! user's display name, formatting timestamps, and linkifying message text.
//! None of these fail; decryption problems fall back to placeholders.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, error};

use crate::crypto::{self, EncryptionKey};
use crate::domain::{AvatarItem, Message, SealedField, User, UserProfile};

pub const UNKNOWN_USER: &str = "Unknown User";
const SELF_LABEL: &str = "You";

fn key_for(user: &User) -> Option<EncryptionKey> {
    let hex_key = user.encryption_key.as_deref()?;
    match EncryptionKey::from_hex(hex_key) {
        Ok(key) => Some(key),
        Err(e) => {
            debug!("Stored key for user {} is unusable: {}", user.id, e);
            None
        }
    }
}

fn open(field: &SealedField, key: &EncryptionKey) -> Option<String> {
    crypto::decrypt(field, key).ok()
}

/// The name shown on the user's own messages.
pub fn display_name(user: Option<&User>) -> String {
    let Some(user) = user else {
        return SELF_LABEL.to_string();
    };
    if let Some(name) = user.name.as_deref().filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if let (Some(sealed), Some(key)) = (&user.encrypted_name, key_for(user)) {
        match crypto::decrypt(sealed, &key) {
            Ok(name) => return name,
            Err(e) => error!("Error decrypting name for user {}: {}", user.id, e),
        }
    }
    UNKNOWN_USER.to_string()
}

/// Opens the encrypted identity fields when all key material is present,
/// otherwise returns the stored plaintext.
pub fn decrypt_profile(user: &User) -> UserProfile {
    let mut profile = UserProfile {
        id: user.id,
        name: user.name.clone(),
        email: None,
        persona: user.persona.clone(),
        about: user.about.clone(),
        knowledge_base: user.knowledge_base.clone(),
    };

    let has_material = user.encryption_key.is_some()
        && (user.encrypted_name.is_some() || user.encrypted_email.is_some());
    if !has_material {
        if user.encrypted_name.is_some() || user.encrypted_email.is_some() {
            error!(
                "Missing encryption data for user {} (has_key: {})",
                user.id,
                user.encryption_key.is_some()
            );
        }
        return profile;
    }

    let Some(key) = key_for(user) else {
        return profile;
    };
    if let Some(sealed) = &user.encrypted_name {
        match open(sealed, &key) {
            Some(name) => profile.name = Some(name),
            None => debug!("Failed to decrypt name for user {}", user.id),
        }
    }
    if let Some(sealed) = &user.encrypted_email {
        match open(sealed, &key) {
            Some(email) => profile.email = Some(email),
            None => debug!("Failed to decrypt email for user {}", user.id),
        }
    }
    profile
}

/// Formats a timestamp as `h:mm AM/PM`.
pub fn format_time(ts: &DateTime<Utc>) -> String {
    ts.format("%-I:%M %p").to_string()
}

pub fn is_own_message(message: &Message, user: Option<&User>) -> bool {
    message.sender == display_name(user)
}

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("url pattern is valid"))
}

pub fn detect_urls(content: &str) -> Vec<&str> {
    url_regex().find_iter(content).map(|m| m.as_str()).collect()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders message text as HTML with every URL turned into a link.
pub fn linkify(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for found in url_regex().find_iter(content) {
        out.push_str(&escape_html(&content[last..found.start()]));
        let url = escape_html(found.as_str());
        out.push_str(&format!(
            r#"<a href="{url}" target="_blank" rel="noopener noreferrer">{url}</a>"#
        ));
        last = found.end();
    }
    out.push_str(&escape_html(&content[last..]));
    out
}

//=========================================================================================
// Avatar card
//=========================================================================================

/// What the primary button on an avatar card does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarAction {
    InUse,
    EditAiFriend,
    UseAsAiFriend,
}

impl AvatarAction {
    pub fn label(&self) -> &'static str {
        match self {
            AvatarAction::InUse => "In Use",
            AvatarAction::EditAiFriend => "Edit AI Friend",
            AvatarAction::UseAsAiFriend => "Use as AI Friend",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, AvatarAction::InUse)
    }
}

impl AvatarItem {
    pub fn action(&self) -> AvatarAction {
        if self.is_in_use {
            AvatarAction::InUse
        } else if self.is_creator && self.has_ai_friend {
            AvatarAction::EditAiFriend
        } else {
            AvatarAction::UseAsAiFriend
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encrypt, generate_encryption_key, generate_salt};
    use crate::domain::fixtures::user;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn encrypted_user(name: &str) -> User {
        let key = generate_encryption_key("secret", &generate_salt()).unwrap();
        let mut u = user(name);
        u.name = None;
        u.encrypted_name = Some(encrypt(name, &key).unwrap());
        u.encryption_key = Some(key.to_hex());
        u
    }

    #[test]
    fn display_name_fallbacks() {
        assert_eq!(display_name(None), "You");
        assert_eq!(display_name(Some(&user("Ana"))), "Ana");
        assert_eq!(display_name(Some(&encrypted_user("Bob"))), "Bob");

        let mut no_key = encrypted_user("Cleo");
        no_key.encryption_key = None;
        assert_eq!(display_name(Some(&no_key)), UNKNOWN_USER);

        let mut wrong_key = encrypted_user("Dan");
        wrong_key.encryption_key = Some(hex::encode([7u8; 32]));
        assert_eq!(display_name(Some(&wrong_key)), UNKNOWN_USER);
    }

    #[test]
    fn decrypt_profile_degrades_to_plaintext() {
        let mut u = encrypted_user("Eve");
        u.name = Some("plain".to_string());
        u.encryption_key = Some("not hex".to_string());
        let profile = decrypt_profile(&u);
        assert_eq!(profile.name.as_deref(), Some("plain"));
        assert_eq!(profile.email, None);
    }

    #[test]
    fn formats_twelve_hour_time() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 15, 7, 0).unwrap();
        assert_eq!(format_time(&ts), "3:07 PM");
        let morning = Utc.with_ymd_and_hms(2024, 5, 1, 0, 30, 0).unwrap();
        assert_eq!(format_time(&morning), "12:30 AM");
    }

    #[test]
    fn linkify_wraps_urls_and_escapes_text() {
        let html = linkify("see <https://example.com/a?b=1> & more");
        assert_eq!(
            html,
            "see &lt;<a href=\"https://example.com/a?b=1\" target=\"_blank\" rel=\"noopener noreferrer\">https://example.com/a?b=1</a>&gt; &amp; more"
        );
        assert_eq!(linkify("no links"), "no links");
        assert_eq!(detect_urls("a http://x.io b https://y.io"), vec!["http://x.io", "https://y.io"]);
    }

    #[test]
    fn own_messages_match_display_name() {
        let ana = user("Ana");
        let msg = Message {
            sender: "Ana".to_string(),
            content: "hi".to_string(),
            timestamp: Utc::now(),
        };
        assert!(is_own_message(&msg, Some(&ana)));
        assert!(!is_own_message(&msg, None));
    }

    #[test]
    fn avatar_action_labels() {
        let mut avatar = AvatarItem {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Robo".to_string(),
            creator: "Ana".to_string(),
            description: "A robot".to_string(),
            image_url: "https://img/robo.png".to_string(),
            interactions: 3,
            tags: vec!["tech".to_string()],
            is_public: true,
            is_featured: false,
            is_favorite: false,
            is_creator: false,
            is_in_use: false,
            has_ai_friend: false,
        };
        assert_eq!(avatar.action().label(), "Use as AI Friend");
        avatar.is_creator = true;
        avatar.has_ai_friend = true;
        assert_eq!(avatar.action(), AvatarAction::EditAiFriend);
        avatar.is_in_use = true;
        assert_eq!(avatar.action().label(), "In Use");
        assert!(!avatar.action().is_enabled());
    }
}
