use axum::Json;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        crate::routes::chats::create_chat,
        crate::routes::chats::list_chats,
        crate::routes::messages::create_message,
        crate::routes::messages::get_messages,
        crate::routes::presence::get_presence,
        crate::routes::relay::relay_handler
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::routes::health::HealthResponse,
            crate::routes::auth::RegisterRequest,
            crate::routes::auth::LoginRequest,
            crate::routes::auth::SessionResponse,
            crate::routes::models::UserResponse,
            crate::routes::models::ChatView,
            crate::routes::models::MessageView,
            crate::routes::chats::CreateChatRequest,
            crate::routes::chats::ChatResponse,
            crate::routes::chats::ChatsResponse,
            crate::routes::messages::CreateMessageRequest,
            crate::routes::messages::MessageResponse,
            crate::routes::messages::MessagesResponse,
            crate::routes::presence::PresenceResponse
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "Accounts and sessions"),
        (name = "chats", description = "Two-party conversations"),
        (name = "messages", description = "Persisted message log"),
        (name = "presence", description = "Who is online"),
        (name = "relay", description = "Realtime WebSocket relay")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
