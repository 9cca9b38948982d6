//! crates/chitchat_core/src/summary.rs
//!
//! Produces a short natural-language description of the roster and keeps
//! the last one in the key-value store, keyed by the roster's fingerprint.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{ROSTER_KEY, SUMMARY_KEY};
use crate::domain::{AiFriend, Roster};
use crate::ports::{KeyValueStore, PortError, PortResult, Prompt, ReasoningService};
use crate::routing::DEFAULT_REASONING_TIMEOUT;

pub const NO_FRIENDS_SUMMARY: &str = "No AI friends available yet.";
pub const SUMMARY_ERROR: &str = "Error occurred while generating friends summary.";
/// What the primary provider answers with when it will not do the work now.
pub const BUSY_PLACEHOLDER: &str = "I am busy now, I will respond later.";

const SYSTEM_INSTRUCTIONS: &str = "You are a summarization agent. Your task is to create a brief summary of the AI friends in the chat.";

//=========================================================================================
// Cache
//=========================================================================================

/// Get/set/invalidate over the two summary entries of a `KeyValueStore`.
///
/// A shared store is partitioned per user with `scoped`; the unscoped cache
/// uses the bare keys.
#[derive(Clone)]
pub struct SummaryCache {
    store: Arc<dyn KeyValueStore>,
    scope: Option<Uuid>,
}

impl SummaryCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, scope: None }
    }

    pub fn scoped(&self, user_id: Uuid) -> Self {
        Self {
            store: self.store.clone(),
            scope: Some(user_id),
        }
    }

    fn key(&self, base: &str) -> String {
        match self.scope {
            Some(user_id) => format!("{}:{}", user_id, base),
            None => base.to_string(),
        }
    }

    /// Returns the cached summary if it was produced from this exact, fully active roster.
    pub fn get(&self, roster: &Roster) -> PortResult<Option<String>> {
        let summary = self.store.get(&self.key(SUMMARY_KEY))?;
        let fingerprint = self.store.get(&self.key(ROSTER_KEY))?;
        match (summary, fingerprint) {
            (Some(summary), Some(fingerprint))
                if fingerprint == roster.fingerprint() && roster.all_active() =>
            {
                Ok(Some(summary))
            }
            _ => Ok(None),
        }
    }

    pub fn set(&self, roster: &Roster, summary: &str) -> PortResult<()> {
        self.store.set(&self.key(SUMMARY_KEY), summary)?;
        self.store.set(&self.key(ROSTER_KEY), &roster.fingerprint())
    }

    /// Removes both entries. They are gone when this returns.
    pub fn invalidate(&self) -> PortResult<()> {
        self.store.remove(&self.key(SUMMARY_KEY))?;
        self.store.remove(&self.key(ROSTER_KEY))
    }
}

//=========================================================================================
// Generator
//=========================================================================================

pub struct SummaryGenerator {
    primary: Arc<dyn ReasoningService>,
    fallback: Arc<dyn ReasoningService>,
    cache: SummaryCache,
    timeout: Duration,
}

impl SummaryGenerator {
    pub fn new(
        primary: Arc<dyn ReasoningService>,
        fallback: Arc<dyn ReasoningService>,
        cache: SummaryCache,
    ) -> Self {
        Self {
            primary,
            fallback,
            cache,
            timeout: DEFAULT_REASONING_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    /// The same generator, caching under `user_id`'s keys.
    pub fn scoped(&self, user_id: Uuid) -> Self {
        Self {
            primary: self.primary.clone(),
            fallback: self.fallback.clone(),
            cache: self.cache.scoped(user_id),
            timeout: self.timeout,
        }
    }

    /// Summarizes the roster, reusing the cached text when the roster is unchanged.
    pub async fn summarize(&self, friends: Option<&[AiFriend]>) -> String {
        let roster = match friends {
            Some(friends) if !friends.is_empty() => Roster::new(friends.to_vec()),
            _ => return NO_FRIENDS_SUMMARY.to_string(),
        };

        match self.cache.get(&roster) {
            Ok(Some(summary)) => {
                debug!("Serving cached roster summary.");
                return summary;
            }
            Ok(None) => {}
            Err(e) => warn!("Summary cache read failed: {}", e),
        }

        match self.generate(&roster).await {
            Ok(summary) => {
                if let Err(e) = self.cache.set(&roster, &summary) {
                    warn!("Failed to cache roster summary: {}", e);
                }
                info!("Generated roster summary for {} friends.", roster.friends().len());
                summary
            }
            Err(e) => {
                error!("Error generating friends summary: {}", e);
                SUMMARY_ERROR.to_string()
            }
        }
    }

    async fn generate(&self, roster: &Roster) -> PortResult<String> {
        let prompt = summary_prompt(roster);

        let summary = self.ask(&self.primary, &prompt).await?;
        if summary.trim() != BUSY_PLACEHOLDER {
            return Ok(summary);
        }
        info!("Primary summarizer is busy; asking the fallback provider.");
        self.ask(&self.fallback, &prompt).await
    }

    async fn ask(&self, provider: &Arc<dyn ReasoningService>, prompt: &Prompt) -> PortResult<String> {
        tokio::time::timeout(self.timeout, provider.complete(prompt))
            .await
            .map_err(|_| PortError::Timeout("roster summary".to_string()))?
    }
}

fn summary_prompt(roster: &Roster) -> Prompt {
    let friends_info = roster
        .friends()
        .iter()
        .map(|f| format!("{}: {}, about: {}", f.name, f.persona, f.about))
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: SYSTEM_INSTRUCTIONS.to_string(),
        user: format!(
            "AI Friends:\n{}\n\nPlease provide a brief summary of these AI friends, highlighting their key characteristics and how they might interact in a group chat.",
            friends_info
        ),
    }
}
