pub mod auth;
pub mod avatars;
pub mod chat;
pub mod friends;
pub mod middleware;
pub mod rest;
pub mod session;
pub mod state;
pub mod users;

pub use middleware::require_auth;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use state::AppState;

/// Builds the API router: public auth and bootstrap routes plus the
/// cookie-protected ones.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/session/bootstrap", post(session::bootstrap_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/users/me", get(users::me_handler).put(users::update_me_handler))
        .route(
            "/friends",
            get(friends::list_friends_handler).post(friends::create_friend_handler),
        )
        .route("/friends/{id}", put(friends::update_friend_handler))
        .route("/friends/{id}/status", post(friends::set_status_handler))
        .route("/chat/route", post(chat::route_handler))
        .route("/chat/summary", get(chat::summary_handler))
        .route("/chat/render", post(chat::render_handler))
        .route("/avatars", get(avatars::list_avatars_handler))
        .route("/avatars/{id}", put(avatars::update_avatar_handler))
        .route("/avatars/{id}/adopt", post(avatars::adopt_avatar_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
