use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use matcha_shared::errors::{AppError, AppResult, ErrorCode};
use matcha_shared::types::auth::AuthUser;
use matcha_shared::types::pagination::CursorPage;
use matcha_shared::types::ApiResponse;

use crate::models::ChatMessage;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    pub before: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

// --- POST /chat/:id ---

pub async fn send_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(receiver_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<ChatMessage>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let message = state.engine.send_chat_message(user.id, receiver_id, &req.message)?;
    Ok(Json(ApiResponse::ok(message)))
}

// --- GET /chat/:id?before=&limit= ---

pub async fn history(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(peer_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<CursorPage<ChatMessage>>>> {
    query
        .validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let page = state
        .engine
        .find_chat_history(user.id, peer_id, query.before, query.limit)?;
    Ok(Json(ApiResponse::ok(page)))
}
