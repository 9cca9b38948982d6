//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::DbSessionProvider;
use crate::config::Config;
use chitchat_core::auth::AuthService;
use chitchat_core::cache::UserQueryCache;
use chitchat_core::friends::FriendService;
use chitchat_core::ports::DatabaseService;
use chitchat_core::routing::RoutingPolicy;
use chitchat_core::summary::SummaryGenerator;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub sessions: Arc<DbSessionProvider>,
    /// Decrypted profiles, dropped on every session change.
    pub users: Arc<UserQueryCache>,
    pub auth: Arc<AuthService>,
    pub friends: Arc<FriendService>,
    pub router: Arc<RoutingPolicy>,
    pub summaries: Arc<SummaryGenerator>,
}
