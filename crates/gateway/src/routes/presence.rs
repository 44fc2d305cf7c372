use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{util::current_user, ApiError, AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PresenceResponse {
    /// Sorted ids of users with a live relay connection.
    pub users: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/presence",
    tag = "presence",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Users currently online", body = PresenceResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_presence(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PresenceResponse>, ApiError> {
    current_user(&state, &headers).await?;

    Ok(Json(PresenceResponse {
        users: state.relay().online_users().await,
    }))
}
