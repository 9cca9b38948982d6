//! services/api/src/web/friends.rs
//!
//! Roster endpoints. Writes go through `FriendService`, which drops the
//! caller's cached roster summary on success.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chitchat_core::domain::{AiFriend, FriendDraft};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::friend_rejection;
use crate::web::state::AppState;

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct FriendResponse {
    pub id: Uuid,
    pub name: String,
    pub persona: String,
    pub about: String,
    pub knowledge_base: String,
    pub status: bool,
    pub avatar_id: Option<Uuid>,
}

impl From<AiFriend> for FriendResponse {
    fn from(f: AiFriend) -> Self {
        Self {
            id: f.id,
            name: f.name,
            persona: f.persona,
            about: f.about,
            knowledge_base: f.knowledge_base,
            status: f.status,
            avatar_id: f.avatar_id,
        }
    }
}

/// Names longer than twelve characters are cut to the first twelve.
#[derive(Deserialize, ToSchema)]
pub struct FriendRequest {
    pub name: String,
    pub persona: String,
    pub about: String,
    #[serde(default)]
    pub knowledge_base: String,
    #[serde(default = "default_status")]
    pub status: bool,
    pub avatar_id: Option<Uuid>,
}

fn default_status() -> bool {
    true
}

impl From<FriendRequest> for FriendDraft {
    fn from(r: FriendRequest) -> Self {
        FriendDraft {
            name: r.name,
            persona: r.persona,
            about: r.about,
            knowledge_base: r.knowledge_base,
            status: r.status,
            avatar_id: r.avatar_id,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct StatusRequest {
    pub status: bool,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the caller's AI friends in creation order.
#[utoipa::path(
    get,
    path = "/friends",
    responses((status = 200, description = "Roster", body = [FriendResponse]))
)]
pub async fn list_friends_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let friends = state.friends.list(user_id).await.map_err(|e| {
        error!("Failed to list friends for {}: {:?}", user_id, e);
        friend_rejection(&e)
    })?;
    Ok(Json(friends.into_iter().map(FriendResponse::from).collect::<Vec<_>>()))
}

#[utoipa::path(
    post,
    path = "/friends",
    request_body = FriendRequest,
    responses(
        (status = 201, description = "Friend created", body = FriendResponse),
        (status = 400, description = "Empty name")
    )
)]
pub async fn create_friend_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<FriendRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let friend = state
        .friends
        .create_friend(user_id, req.into())
        .await
        .map_err(|e| {
            error!("Failed to create friend for {}: {:?}", user_id, e);
            friend_rejection(&e)
        })?;
    Ok((StatusCode::CREATED, Json(FriendResponse::from(friend))))
}

#[utoipa::path(
    put,
    path = "/friends/{id}",
    request_body = FriendRequest,
    params(("id" = Uuid, Path, description = "AI friend id")),
    responses(
        (status = 200, description = "Friend updated", body = FriendResponse),
        (status = 404, description = "No such friend")
    )
)]
pub async fn update_friend_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(friend_id): Path<Uuid>,
    Json(req): Json<FriendRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let friend = state
        .friends
        .update_friend(user_id, friend_id, req.into())
        .await
        .map_err(|e| {
            error!("Failed to update friend {}: {:?}", friend_id, e);
            friend_rejection(&e)
        })?;
    Ok(Json(FriendResponse::from(friend)))
}

/// Activate or deactivate a friend.
#[utoipa::path(
    post,
    path = "/friends/{id}/status",
    request_body = StatusRequest,
    params(("id" = Uuid, Path, description = "AI friend id")),
    responses(
        (status = 200, description = "Status changed", body = FriendResponse),
        (status = 404, description = "No such friend")
    )
)]
pub async fn set_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(friend_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let friend = state
        .friends
        .set_status(user_id, friend_id, req.status)
        .await
        .map_err(|e| {
            error!("Failed to set status of friend {}: {:?}", friend_id, e);
            friend_rejection(&e)
        })?;
    Ok(Json(FriendResponse::from(friend)))
}
