//! services/api/src/adapters/session.rs
//!
//! The remote session provider backed by the `auth_sessions` table. Sign-in
//! and sign-out are published on a broadcast channel so that session
//! orchestrators and caches can react to them.

use async_trait::async_trait;
use chitchat_core::ports::{DatabaseService, PortError, PortResult, SessionEvent, SessionProvider};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

pub struct DbSessionProvider {
    db: Arc<dyn DatabaseService>,
    events: broadcast::Sender<SessionEvent>,
}

impl DbSessionProvider {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { db, events }
    }

    /// Announces a fresh sign-in to every subscriber.
    pub fn signed_in(&self, user_id: Uuid) {
        self.publish(SessionEvent::SignedIn { user_id });
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        if self.events.send(event.clone()).is_err() {
            debug!("No session listeners for {:?}", event);
        }
    }
}

#[async_trait]
impl SessionProvider for DbSessionProvider {
    async fn current_session(&self, token: Option<&str>) -> PortResult<Option<Uuid>> {
        let Some(token) = token else {
            return Ok(None);
        };
        match self.db.validate_auth_session(token).await {
            Ok(user_id) => Ok(Some(user_id)),
            Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn sign_out(&self, token: &str) -> PortResult<()> {
        self.db.delete_auth_session(token).await?;
        self.publish(SessionEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
