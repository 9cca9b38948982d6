//! services/api/src/web/chat.rs
//!
//! Chat endpoints: choosing which friends answer a message, describing the
//! roster, and rendering a thread for display.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use chitchat_core::domain::Message;
use chitchat_core::presentation::{format_time, is_own_message, linkify};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::port_rejection;
use crate::web::state::AppState;

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RouteRequest {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct RouteResponse {
    /// Names of the friends that should reply, in order. May repeat a name.
    pub friends: Option<Vec<String>>,
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ThreadMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct RenderRequest {
    pub messages: Vec<ThreadMessage>,
}

#[derive(Serialize, ToSchema)]
pub struct RenderedMessage {
    pub sender: String,
    /// Escaped HTML with links made clickable.
    pub html: String,
    pub time: String,
    pub is_own: bool,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Decide which active friends reply to a message.
#[utoipa::path(
    post,
    path = "/chat/route",
    request_body = RouteRequest,
    responses((status = 200, description = "Responding friends", body = RouteResponse))
)]
pub async fn route_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<RouteRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state.db.get_user(user_id).await.map_err(|e| {
        error!("Failed to load user {}: {:?}", user_id, e);
        port_rejection(&e)
    })?;
    let roster = state.db.list_friends(user_id).await.map_err(|e| {
        error!("Failed to load roster for {}: {:?}", user_id, e);
        port_rejection(&e)
    })?;

    let friends = state.router.route(&req.message, &user, Some(&roster)).await;
    Ok(Json(RouteResponse { friends }))
}

/// Describe the caller's roster in a few sentences.
#[utoipa::path(
    get,
    path = "/chat/summary",
    responses((status = 200, description = "Roster summary", body = SummaryResponse))
)]
pub async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let roster = state.db.list_friends(user_id).await.map_err(|e| {
        error!("Failed to load roster for {}: {:?}", user_id, e);
        port_rejection(&e)
    })?;

    let summary = state.summaries.scoped(user_id).summarize(Some(&roster)).await;
    Ok(Json(SummaryResponse { summary }))
}

/// Render a thread: linkified bodies, 12-hour times and own-message flags.
#[utoipa::path(
    post,
    path = "/chat/render",
    request_body = RenderRequest,
    responses((status = 200, description = "Rendered messages", body = [RenderedMessage]))
)]
pub async fn render_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<RenderRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // A missing user matches only messages sent as "You".
    let user = state.db.get_user(user_id).await.ok();

    let rendered = req
        .messages
        .into_iter()
        .map(|m| {
            let message = Message {
                sender: m.sender,
                content: m.content,
                timestamp: m.timestamp,
            };
            RenderedMessage {
                is_own: is_own_message(&message, user.as_ref()),
                html: linkify(&message.content),
                time: format_time(&message.timestamp),
                sender: message.sender,
            }
        })
        .collect::<Vec<_>>();
    Ok(Json(rendered))
}
