//! crates/chitchat_core/src/cache.rs
//!
//! In-process caches: a memory-backed `KeyValueStore` and the cache of
//! decrypted user profiles that session changes invalidate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::UserProfile;
use crate::ports::{KeyValueStore, PortError, PortResult};

/// Key holding the cached roster summary text.
pub const SUMMARY_KEY: &str = "aiFriendsSummary";
/// Key holding the fingerprint of the roster the summary was produced from.
pub const ROSTER_KEY: &str = "cachedAIFriendsData";
/// Key holding the locally persisted user id.
pub const USER_ID_KEY: &str = "userId";

/// A `KeyValueStore` that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        store
    }
}

fn poisoned<T>(_: T) -> PortError {
    PortError::Unexpected("key-value store lock poisoned".to_string())
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.entries
            .lock()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        self.entries.lock().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

//=========================================================================================
// User Query Cache
//=========================================================================================

/// Decrypted user profiles keyed by user id.
#[derive(Debug, Default)]
pub struct UserQueryCache {
    entries: RwLock<HashMap<Uuid, UserProfile>>,
}

impl UserQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: Uuid) -> Option<UserProfile> {
        self.entries.read().ok()?.get(&user_id).cloned()
    }

    /// Returns the cached profile or runs `fetch` and caches its result.
    pub async fn get_or_fetch<F, Fut>(&self, user_id: Uuid, fetch: F) -> PortResult<UserProfile>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PortResult<UserProfile>>,
    {
        if let Some(profile) = self.get(user_id) {
            return Ok(profile);
        }
        let profile = fetch().await?;
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(user_id, profile.clone());
        Ok(profile)
    }

    pub fn invalidate(&self, user_id: Uuid) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&user_id);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn profile(id: Uuid) -> UserProfile {
        UserProfile {
            id,
            name: Some("Ana".to_string()),
            email: None,
            persona: "Friendly".to_string(),
            about: "chatting".to_string(),
            knowledge_base: "Basic knowledge".to_string(),
        }
    }

    #[test]
    fn memory_store_set_get_remove() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get(USER_ID_KEY).unwrap(), None);
        store.set(USER_ID_KEY, "abc").unwrap();
        assert_eq!(store.get(USER_ID_KEY).unwrap().as_deref(), Some("abc"));
        store.remove(USER_ID_KEY).unwrap();
        assert_eq!(store.get(USER_ID_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn user_cache_fetches_once_until_invalidated() {
        let cache = UserQueryCache::new();
        let id = Uuid::new_v4();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_fetch(id, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(profile(id))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate_all();
        assert!(cache.is_empty());
        cache
            .get_or_fetch(id, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(profile(id))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
