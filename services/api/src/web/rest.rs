//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::OpenApi;

use crate::web::{auth, avatars, chat, friends, session, users};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        session::bootstrap_handler,
        users::me_handler,
        users::update_me_handler,
        friends::list_friends_handler,
        friends::create_friend_handler,
        friends::update_friend_handler,
        friends::set_status_handler,
        chat::route_handler,
        chat::summary_handler,
        chat::render_handler,
        avatars::list_avatars_handler,
        avatars::update_avatar_handler,
        avatars::adopt_avatar_handler,
    ),
    components(
        schemas(
            auth::LoginRequest,
            auth::AuthResponse,
            session::BootstrapResponse,
            users::ProfileResponse,
            users::UpdateProfileRequest,
            friends::FriendResponse,
            friends::FriendRequest,
            friends::StatusRequest,
            chat::RouteRequest,
            chat::RouteResponse,
            chat::SummaryResponse,
            chat::ThreadMessage,
            chat::RenderRequest,
            chat::RenderedMessage,
            avatars::AvatarResponse,
            avatars::AvatarUpdateRequest,
        )
    ),
    tags(
        (name = "Chitchat API", description = "Group chat with AI friends: sign-in, roster, routing and summaries.")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/session/bootstrap",
            "/friends/{id}/status",
            "/chat/route",
            "/chat/summary",
            "/avatars/{id}/adopt",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
