//! services/api/src/web/users.rs
//!
//! The signed-in user's own profile.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use chitchat_core::presentation::{decrypt_profile, UNKNOWN_USER};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::port_rejection;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub display_name: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub persona: String,
    pub about: String,
    pub knowledge_base: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub persona: String,
    pub about: String,
    pub knowledge_base: String,
}

async fn load_profile(state: &AppState, user_id: Uuid) -> Result<ProfileResponse, (StatusCode, String)> {
    let db = state.db.clone();
    let profile = state
        .users
        .get_or_fetch(user_id, || async move {
            let user = db.get_user(user_id).await?;
            Ok(decrypt_profile(&user))
        })
        .await
        .map_err(|e| {
            error!("Failed to load profile for {}: {:?}", user_id, e);
            port_rejection(&e)
        })?;

    let shown = profile
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_USER.to_string());
    Ok(ProfileResponse {
        id: profile.id,
        display_name: shown,
        name: profile.name,
        email: profile.email,
        persona: profile.persona,
        about: profile.about,
        knowledge_base: profile.knowledge_base,
    })
}

/// The caller's decrypted profile.
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    Ok(Json(load_profile(&state, user_id).await?))
}

/// Edit the caller's persona fields.
#[utoipa::path(
    put,
    path = "/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .update_user_profile(user_id, &req.persona, &req.about, &req.knowledge_base)
        .await
        .map_err(|e| {
            error!("Failed to update profile for {}: {:?}", user_id, e);
            port_rejection(&e)
        })?;
    state.users.invalidate(user_id);
    info!("Updated profile of user {}", user_id);

    Ok(Json(load_profile(&state, user_id).await?))
}
