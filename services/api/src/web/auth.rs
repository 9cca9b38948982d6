//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: username + email sign-in (registering unknown
//! emails) and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{auth_rejection, port_rejection};
use crate::web::middleware::session_token;
use crate::web::state::AppState;
use chitchat_core::ports::SessionProvider;

const SESSION_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    /// True when this request registered the account.
    pub created: bool,
}

fn session_cookie(auth_session_id: &str) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        auth_session_id,
        Duration::days(SESSION_DAYS).num_seconds()
    )
}

/// Stores a fresh auth session for `user_id` and returns its `Set-Cookie` value.
pub(crate) async fn start_session(state: &AppState, user_id: Uuid) -> Result<String, (StatusCode, String)> {
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    state
        .db
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
        })?;
    Ok(session_cookie(&auth_session_id))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Sign in, registering the email if it is new
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Missing fields or invalid email"),
        (status = 401, description = "Invalid username or email combination"),
        (status = 409, description = "Email already in use"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let outcome = state
        .auth
        .sign_in_or_register(&req.username, &req.email)
        .await
        .map_err(|e| {
            error!("Sign-in failed: {:?}", e);
            auth_rejection(&e)
        })?;

    let cookie = start_session(&state, outcome.user_id).await?;
    state.sessions.signed_in(outcome.user_id);
    info!("Session started for user {}", outcome.user_id);

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user_id: outcome.user_id,
            created: outcome.created,
        }),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let auth_session_id =
        session_token(&headers).ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state.sessions.sign_out(auth_session_id).await.map_err(|e| {
        error!("Failed to delete auth session: {:?}", e);
        port_rejection(&e)
    })?;

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}
