//! crates/chitchat_core/src/crypto.rs
//!
//! Identity encryption: salt generation, email hashing, Argon2 key derivation
//! and AES-256-GCM sealing of the user's display name and email.
//!
//! Ciphertext, IV and tag are stored hex encoded and separately, so the GCM
//! tag is split off the end of the ciphertext on encrypt and re-attached on
//! decrypt.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::Argon2;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::SealedField;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SALT_LEN: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The tag did not verify: wrong key, or tampered ciphertext/iv/tag.
    #[error("authentication tag verification failed")]
    Verification,
    #[error("malformed encrypted field: {0}")]
    Encoding(String),
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed")]
    Encryption,
}

/// A 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded).map_err(|e| CryptoError::Encoding(e.to_string()))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::Encoding("invalid key length".to_string()))?;
        Ok(Self(key))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Generates a random 128-bit salt, hex encoded.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

/// SHA-256 of the email, hex encoded. Used as the lookup key for users.
pub fn hash_email(email: &str) -> String {
    hex::encode(Sha256::digest(email.as_bytes()))
}

/// Derives a key from secret material and a salt with Argon2id.
/// The same inputs always yield the same key.
pub fn generate_encryption_key(secret: &str, salt: &str) -> Result<EncryptionKey, CryptoError> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), salt.as_bytes(), &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(EncryptionKey(key))
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<SealedField, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|_| CryptoError::Encryption)?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(SealedField {
        ciphertext: hex::encode(sealed),
        iv: hex::encode(iv),
        tag: hex::encode(tag),
    })
}

/// Opens a sealed field. Fails with `CryptoError::Verification` when the tag does not verify.
pub fn decrypt(field: &SealedField, key: &EncryptionKey) -> Result<String, CryptoError> {
    let decode = |part: &str, what: &str| {
        hex::decode(part).map_err(|e| CryptoError::Encoding(format!("{}: {}", what, e)))
    };
    let mut payload = decode(&field.ciphertext, "ciphertext")?;
    let iv = decode(&field.iv, "iv")?;
    let tag = decode(&field.tag, "tag")?;

    if iv.len() != IV_LEN {
        return Err(CryptoError::Encoding(format!("iv must be {} bytes", IV_LEN)));
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::Encoding(format!("tag must be {} bytes", TAG_LEN)));
    }
    payload.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), payload.as_ref())
        .map_err(|_| CryptoError::Verification)?;

    String::from_utf8(plaintext).map_err(|e| CryptoError::Encoding(e.to_string()))
}
