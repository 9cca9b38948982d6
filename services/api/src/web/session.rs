//! services/api/src/web/session.rs
//!
//! `POST /session/bootstrap`: resolves who the caller is. The caller's local
//! storage is represented by a request-scoped store seeded from `x-user-id`;
//! the resolved id comes back in the response for the client to keep.
//!
//! A caller who ends up as a guest is issued a `session` cookie for that
//! guest, so the protected routes accept them like any signed-in user.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use chitchat_core::cache::{MemoryKvStore, USER_ID_KEY};
use chitchat_core::session::{verified_guest, SessionOrchestrator, SessionState};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_rejection, INTERNAL_MESSAGE};
use crate::web::auth::start_session;
use crate::web::middleware::session_token;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct BootstrapResponse {
    /// `authenticated` or `unauthenticated` (a guest).
    pub state: String,
    /// The id the client should act as and store locally.
    pub user_id: Uuid,
}

fn local_user_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

/// The answer for a resolved session: its label, the id to act as, and
/// whether a guest cookie must be issued.
fn outcome(resolved: &SessionState) -> Option<(&'static str, Uuid, bool)> {
    match resolved {
        SessionState::Authenticated { user_id } => Some(("authenticated", *user_id, false)),
        SessionState::Unauthenticated {
            local_user_id: Some(user_id),
        } => Some(("unauthenticated", *user_id, true)),
        _ => None,
    }
}

/// Resolve the caller's session, creating a guest user on first visit.
#[utoipa::path(
    post,
    path = "/session/bootstrap",
    responses(
        (status = 200, description = "Session resolved; guests also receive a session cookie", body = BootstrapResponse),
        (status = 500, description = "Session could not be resolved")
    ),
    params(
        ("x-user-id" = Option<Uuid>, Header, description = "The locally stored user id, if any.")
    )
)]
pub async fn bootstrap_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Unknown or registered ids are not trusted as local guest identities.
    let guest = match local_user_id(&headers) {
        Some(claimed) => verified_guest(state.db.as_ref(), claimed).await.map_err(|e| {
            error!("Failed to check local user id {}: {:?}", claimed, e);
            port_rejection(&e)
        })?,
        None => None,
    };
    let store = match guest {
        Some(id) => MemoryKvStore::with_entry(USER_ID_KEY, &id.to_string()),
        None => MemoryKvStore::new(),
    };

    let orchestrator = SessionOrchestrator::new(
        state.sessions.clone(),
        state.db.clone(),
        Arc::new(store),
        state.users.clone(),
    );
    let resolved = orchestrator.load(session_token(&headers)).await;

    let Some((label, user_id, needs_cookie)) = outcome(&resolved) else {
        error!("Session bootstrap failed: {:?}", resolved);
        return Err((StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()));
    };

    let mut response_headers = HeaderMap::new();
    if needs_cookie {
        let cookie = start_session(&state, user_id).await?;
        let value = HeaderValue::from_str(&cookie).map_err(|e| {
            error!("Invalid session cookie: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
        })?;
        response_headers.insert(header::SET_COOKIE, value);
        info!("Guest session started for user {}", user_id);
    }

    Ok((
        response_headers,
        Json(BootstrapResponse {
            state: label.to_string(),
            user_id,
        }),
    ))
}
