//! services/api/src/web/avatars.rs
//!
//! The avatar gallery.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chitchat_core::domain::{AvatarItem, AvatarUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{friend_rejection, port_rejection};
use crate::web::friends::FriendResponse;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct AvatarResponse {
    pub id: Uuid,
    pub name: String,
    pub creator: String,
    pub description: String,
    pub image_url: String,
    pub interactions: i64,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_featured: bool,
    pub is_favorite: bool,
    pub is_creator: bool,
    pub is_in_use: bool,
    /// Label of the card's primary button.
    pub action: String,
    pub action_enabled: bool,
}

impl From<AvatarItem> for AvatarResponse {
    fn from(a: AvatarItem) -> Self {
        let action = a.action();
        Self {
            id: a.id,
            name: a.name,
            creator: a.creator,
            description: a.description,
            image_url: a.image_url,
            interactions: a.interactions,
            tags: a.tags,
            is_public: a.is_public,
            is_featured: a.is_featured,
            is_favorite: a.is_favorite,
            is_creator: a.is_creator,
            is_in_use: a.is_in_use,
            action: action.label().to_string(),
            action_enabled: action.is_enabled(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AvatarUpdateRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_public: bool,
}

/// Public avatars plus the caller's own.
#[utoipa::path(
    get,
    path = "/avatars",
    responses((status = 200, description = "Gallery", body = [AvatarResponse]))
)]
pub async fn list_avatars_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let avatars = state.db.list_avatars(user_id).await.map_err(|e| {
        error!("Failed to list avatars for {}: {:?}", user_id, e);
        port_rejection(&e)
    })?;
    Ok(Json(avatars.into_iter().map(AvatarResponse::from).collect::<Vec<_>>()))
}

/// Edit an avatar the caller created.
#[utoipa::path(
    put,
    path = "/avatars/{id}",
    request_body = AvatarUpdateRequest,
    params(("id" = Uuid, Path, description = "Avatar id")),
    responses(
        (status = 200, description = "Avatar updated", body = AvatarResponse),
        (status = 404, description = "No such avatar owned by the caller")
    )
)]
pub async fn update_avatar_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(avatar_id): Path<Uuid>,
    Json(req): Json<AvatarUpdateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let update = AvatarUpdate {
        name: req.name,
        description: req.description,
        tags: req.tags,
        is_public: req.is_public,
    };
    let avatar = state
        .db
        .update_avatar(user_id, avatar_id, update)
        .await
        .map_err(|e| {
            error!("Failed to update avatar {}: {:?}", avatar_id, e);
            port_rejection(&e)
        })?;
    Ok(Json(AvatarResponse::from(avatar)))
}

/// Turn an avatar into an active AI friend.
#[utoipa::path(
    post,
    path = "/avatars/{id}/adopt",
    params(("id" = Uuid, Path, description = "Avatar id")),
    responses(
        (status = 201, description = "Friend created from the avatar", body = FriendResponse),
        (status = 404, description = "No such avatar"),
        (status = 409, description = "Avatar already in use")
    )
)]
pub async fn adopt_avatar_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(avatar_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let friend = state
        .friends
        .adopt_avatar(user_id, avatar_id)
        .await
        .map_err(|e| {
            error!("Failed to adopt avatar {}: {:?}", avatar_id, e);
            friend_rejection(&e)
        })?;
    info!("User {} adopted avatar {}", user_id, avatar_id);
    Ok((StatusCode::CREATED, Json(FriendResponse::from(friend))))
}
