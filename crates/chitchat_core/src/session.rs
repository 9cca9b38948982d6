//! crates/chitchat_core/src/session.rs
//!
//! The auth/session orchestrator: resolves who the caller is on load, keeps
//! the local `userId` entry in step with the remote session, and drops cached
//! user data whenever the session changes.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::{UserQueryCache, USER_ID_KEY};
use crate::domain::NewUser;
use crate::ports::{
    DatabaseService, KeyValueStore, PortError, PortResult, SessionEvent, SessionProvider,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Loading,
    Unauthenticated { local_user_id: Option<Uuid> },
    Authenticated { user_id: Uuid },
    Error { message: String },
}

impl SessionState {
    /// The user id the app should act as, whether signed in or local.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            SessionState::Authenticated { user_id } => Some(*user_id),
            SessionState::Unauthenticated { local_user_id } => *local_user_id,
            _ => None,
        }
    }
}

/// Shared pieces the orchestrator and its listener task both write to.
#[derive(Clone)]
struct Shared {
    state: Arc<RwLock<SessionState>>,
    store: Arc<dyn KeyValueStore>,
    users: Arc<UserQueryCache>,
}

impl Shared {
    fn set_state(&self, next: SessionState) {
        match self.state.write() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn persist_user_id(&self, user_id: Uuid) {
        if let Err(e) = self.store.set(USER_ID_KEY, &user_id.to_string()) {
            warn!("Failed to persist local user id {}: {}", user_id, e);
        }
    }

    fn apply(&self, event: SessionEvent) {
        match event {
            SessionEvent::SignedIn { user_id } => {
                info!("User {} signed in; dropping cached profiles.", user_id);
                self.persist_user_id(user_id);
                self.set_state(SessionState::Authenticated { user_id });
            }
            SessionEvent::SignedOut => {
                let local_user_id = self.local_user_id();
                self.set_state(SessionState::Unauthenticated { local_user_id });
            }
        }
        self.users.invalidate_all();
    }

    fn local_user_id(&self) -> Option<Uuid> {
        self.store
            .get(USER_ID_KEY)
            .ok()
            .flatten()
            .and_then(|raw| Uuid::parse_str(&raw).ok())
    }
}

pub struct SessionOrchestrator {
    provider: Arc<dyn SessionProvider>,
    db: Arc<dyn DatabaseService>,
    shared: Shared,
}

impl SessionOrchestrator {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        db: Arc<dyn DatabaseService>,
        store: Arc<dyn KeyValueStore>,
        users: Arc<UserQueryCache>,
    ) -> Self {
        Self {
            provider,
            db,
            shared: Shared {
                state: Arc::new(RwLock::new(SessionState::Loading)),
                store,
                users,
            },
        }
    }

    pub fn state(&self) -> SessionState {
        match self.shared.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Resolves the session on start-up.
    ///
    /// A live remote session wins. Without one, an existing local id is kept;
    /// with neither, a guest user is created and its id stored locally.
    pub async fn load(&self, token: Option<&str>) -> SessionState {
        self.shared.set_state(SessionState::Loading);

        let next = match self.resolve(token).await {
            Ok(state) => state,
            Err(e) => {
                error!("Error in session load: {}", e);
                SessionState::Error {
                    message: e.to_string(),
                }
            }
        };
        self.shared.set_state(next.clone());
        next
    }

    async fn resolve(&self, token: Option<&str>) -> PortResult<SessionState> {
        if let Some(user_id) = self.provider.current_session(token).await? {
            self.shared.persist_user_id(user_id);
            return Ok(SessionState::Authenticated { user_id });
        }

        if let Some(local_user_id) = self.shared.local_user_id() {
            return Ok(SessionState::Unauthenticated {
                local_user_id: Some(local_user_id),
            });
        }

        let user = self.db.create_user(NewUser::guest()).await?;
        self.shared.store.set(USER_ID_KEY, &user.id.to_string())?;
        info!("Created guest user {}", user.id);
        Ok(SessionState::Unauthenticated {
            local_user_id: Some(user.id),
        })
    }

    /// Starts listening for session changes. The listener stops when the
    /// returned subscription is dropped, whether or not `load` has finished.
    pub fn watch(&self) -> SessionSubscription {
        SessionSubscription::spawn(self.provider.subscribe(), self.shared.clone())
    }

    /// Ends the remote session and forgets the local identity.
    pub async fn logout(&self, token: Option<&str>) -> PortResult<()> {
        if let Some(token) = token {
            self.provider.sign_out(token).await?;
        }
        self.shared.store.remove(USER_ID_KEY)?;
        self.shared.users.invalidate_all();
        self.shared.set_state(SessionState::Unauthenticated {
            local_user_id: None,
        });
        Ok(())
    }
}

/// Accepts a locally stored id as a guest identity only when it names an
/// existing user that never registered an email.
pub async fn verified_guest(db: &dyn DatabaseService, claimed: Uuid) -> PortResult<Option<Uuid>> {
    match db.get_user(claimed).await {
        Ok(user) if user.email_hash.is_none() => Ok(Some(user.id)),
        Ok(_) | Err(PortError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

//=========================================================================================
// Subscription
//=========================================================================================

/// A running session-change listener. Dropping it unsubscribes.
pub struct SessionSubscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionSubscription {
    fn spawn(mut events: broadcast::Receiver<SessionEvent>, shared: Shared) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => shared.apply(event),
                        Err(RecvError::Lagged(missed)) => {
                            warn!("Session listener lagged by {} events; dropping cached users.", missed);
                            shared.users.invalidate_all();
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the listener and waits for it to exit.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Session listener ended abnormally: {:?}", e);
            }
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;
    use crate::domain::UserProfile;
    use crate::testing::InMemoryDb;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeProvider {
        session: Mutex<Option<Uuid>>,
        fail: bool,
        events: broadcast::Sender<SessionEvent>,
    }

    impl FakeProvider {
        fn new(session: Option<Uuid>) -> Self {
            let (events, _) = broadcast::channel(8);
            Self {
                session: Mutex::new(session),
                fail: false,
                events,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(None)
            }
        }
    }

    #[async_trait]
    impl SessionProvider for FakeProvider {
        async fn current_session(&self, _token: Option<&str>) -> PortResult<Option<Uuid>> {
            if self.fail {
                return Err(PortError::Unexpected("auth backend down".to_string()));
            }
            Ok(*self.session.lock().unwrap())
        }

        async fn sign_out(&self, _token: &str) -> PortResult<()> {
            *self.session.lock().unwrap() = None;
            let _ = self.events.send(SessionEvent::SignedOut);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
            self.events.subscribe()
        }
    }

    struct Harness {
        provider: Arc<FakeProvider>,
        db: Arc<InMemoryDb>,
        store: Arc<MemoryKvStore>,
        users: Arc<UserQueryCache>,
        orchestrator: SessionOrchestrator,
    }

    fn harness(provider: FakeProvider, store: MemoryKvStore) -> Harness {
        let provider = Arc::new(provider);
        let db = Arc::new(InMemoryDb::new());
        let store = Arc::new(store);
        let users = Arc::new(UserQueryCache::new());
        let orchestrator =
            SessionOrchestrator::new(provider.clone(), db.clone(), store.clone(), users.clone());
        Harness {
            provider,
            db,
            store,
            users,
            orchestrator,
        }
    }

    fn profile(id: Uuid) -> UserProfile {
        UserProfile {
            id,
            name: Some("Ana".to_string()),
            email: None,
            persona: "Friendly".to_string(),
            about: String::new(),
            knowledge_base: String::new(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn live_session_authenticates_and_stores_id() {
        let user_id = Uuid::new_v4();
        let h = harness(FakeProvider::new(Some(user_id)), MemoryKvStore::new());

        let state = h.orchestrator.load(Some("token")).await;
        assert_eq!(state, SessionState::Authenticated { user_id });
        assert_eq!(h.store.get(USER_ID_KEY).unwrap(), Some(user_id.to_string()));
        assert_eq!(h.db.user_count(), 0);
    }

    #[tokio::test]
    async fn first_visit_creates_exactly_one_guest() {
        let h = harness(FakeProvider::new(None), MemoryKvStore::new());

        let state = h.orchestrator.load(None).await;
        let guest_id = state.user_id().unwrap();
        assert_eq!(h.db.user_count(), 1);
        assert_eq!(h.db.user(guest_id).unwrap().persona, NewUser::guest().persona);
        assert_eq!(h.store.get(USER_ID_KEY).unwrap(), Some(guest_id.to_string()));

        let again = h.orchestrator.load(None).await;
        assert_eq!(again.user_id(), Some(guest_id));
        assert_eq!(h.db.user_count(), 1);
    }

    #[tokio::test]
    async fn existing_local_id_is_kept() {
        let local = Uuid::new_v4();
        let store = MemoryKvStore::with_entry(USER_ID_KEY, &local.to_string());
        let h = harness(FakeProvider::new(None), store);

        let state = h.orchestrator.load(None).await;
        assert_eq!(
            state,
            SessionState::Unauthenticated {
                local_user_id: Some(local)
            }
        );
        assert_eq!(h.db.user_count(), 0);
    }

    #[tokio::test]
    async fn provider_failure_becomes_error_state() {
        let h = harness(FakeProvider::failing(), MemoryKvStore::new());
        let state = h.orchestrator.load(None).await;
        assert!(matches!(state, SessionState::Error { .. }));
        assert_eq!(h.orchestrator.state(), state);
    }

    #[tokio::test]
    async fn sign_in_event_updates_state_and_drops_cached_users() {
        let h = harness(FakeProvider::new(None), MemoryKvStore::new());
        let _subscription = h.orchestrator.watch();
        let stale = Uuid::new_v4();
        h.users.get_or_fetch(stale, || async move { Ok(profile(stale)) }).await.unwrap();

        let user_id = Uuid::new_v4();
        h.provider.events.send(SessionEvent::SignedIn { user_id }).unwrap();
        settle().await;

        assert_eq!(h.orchestrator.state(), SessionState::Authenticated { user_id });
        assert_eq!(h.store.get(USER_ID_KEY).unwrap(), Some(user_id.to_string()));
        assert!(h.users.is_empty());
    }

    #[tokio::test]
    async fn dropped_subscription_stops_listening() {
        let h = harness(FakeProvider::new(None), MemoryKvStore::new());
        let subscription = h.orchestrator.watch();
        assert!(subscription.is_active());
        drop(subscription);
        settle().await;

        let _ = h
            .provider
            .events
            .send(SessionEvent::SignedIn { user_id: Uuid::new_v4() });
        settle().await;
        assert_eq!(h.orchestrator.state(), SessionState::Loading);
    }

    #[tokio::test]
    async fn unsubscribe_waits_for_listener() {
        let h = harness(FakeProvider::new(None), MemoryKvStore::new());
        let subscription = h.orchestrator.watch();
        subscription.unsubscribe().await;
        assert_eq!(h.provider.events.receiver_count(), 0);
    }

    #[tokio::test]
    async fn logout_clears_local_identity() {
        let user_id = Uuid::new_v4();
        let h = harness(FakeProvider::new(Some(user_id)), MemoryKvStore::new());
        h.orchestrator.load(Some("token")).await;
        h.users.get_or_fetch(user_id, || async move { Ok(profile(user_id)) }).await.unwrap();

        h.orchestrator.logout(Some("token")).await.unwrap();
        assert_eq!(
            h.orchestrator.state(),
            SessionState::Unauthenticated { local_user_id: None }
        );
        assert_eq!(h.store.get(USER_ID_KEY).unwrap(), None);
        assert!(h.users.is_empty());
    }

    #[tokio::test]
    async fn only_existing_guests_are_verified() {
        let db = InMemoryDb::new();
        let guest = db.create_user(NewUser::guest()).await.unwrap();
        let registered = db
            .create_user(NewUser {
                email_hash: Some("abc123".to_string()),
                ..NewUser::guest()
            })
            .await
            .unwrap();

        assert_eq!(verified_guest(&db, guest.id).await.unwrap(), Some(guest.id));
        assert_eq!(verified_guest(&db, registered.id).await.unwrap(), None);
        assert_eq!(verified_guest(&db, Uuid::new_v4()).await.unwrap(), None);
    }
}
