use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{routes::models::ChatView, util::current_user, ApiError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChatRequest {
    pub peer_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub chat: ChatView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatsResponse {
    pub chats: Vec<ChatView>,
}

#[utoipa::path(
    post,
    path = "/api/chats",
    tag = "chats",
    security(("bearerAuth" = [])),
    request_body = CreateChatRequest,
    responses(
        (status = 200, description = "The chat between the caller and the peer", body = ChatResponse),
        (status = 400, description = "Peer is the caller", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Peer does not exist", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let peer_id = payload.peer_id.trim();
    if peer_id.is_empty() {
        return Err(ApiError::bad_request("peer_id is required"));
    }

    let chat = state.chats().find_or_create(&user.public_id, peer_id).await?;
    Ok(Json(ChatResponse { chat: chat.into() }))
}

#[utoipa::path(
    get,
    path = "/api/chats",
    tag = "chats",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Chats of the caller, most recent activity first", body = ChatsResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatsResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let chats = state.chats().list_for_user(&user.public_id).await?;
    Ok(Json(ChatsResponse {
        chats: chats.into_iter().map(ChatView::from).collect(),
    }))
}
