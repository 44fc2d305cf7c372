use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use parley_database::CreateMessageRequest as AppendMessage;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{routes::models::MessageView, util::current_user, ApiError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMessageRequest {
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub client_message_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: MessageView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessagesResponse {
    pub messages: Vec<MessageView>,
}

#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    security(("bearerAuth" = [])),
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = MessageResponse),
        (status = 400, description = "Empty content or caller not a participant", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Chat not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let user = current_user(&state, &headers).await?;

    let mut request = AppendMessage::new(payload.chat_id, user.public_id, payload.content);
    if let Some(client_message_id) = payload.client_message_id.filter(|id| !id.trim().is_empty()) {
        request = request.with_client_message_id(client_message_id);
    }

    let message = state.messages().append(&request).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: message.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/messages/{chat_id}",
    tag = "messages",
    security(("bearerAuth" = [])),
    params(
        ("chat_id" = String, Path, description = "Chat ID")
    ),
    responses(
        (status = 200, description = "Messages in creation order", body = MessagesResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not a participant", body = crate::error::ErrorResponse),
        (status = 404, description = "Chat not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessagesResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let chat = state
        .chats()
        .find_by_public_id(&chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    if !chat.has_participant(&user.public_id) {
        return Err(ApiError::forbidden("not a participant of this chat"));
    }

    let messages = state.messages().list_for_chat(&chat.public_id).await?;
    Ok(Json(MessagesResponse {
        messages: messages.into_iter().map(MessageView::from).collect(),
    }))
}
