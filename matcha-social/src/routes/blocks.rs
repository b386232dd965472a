use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use matcha_shared::errors::AppResult;
use matcha_shared::types::auth::AuthUser;
use matcha_shared::types::ApiResponse;

use crate::models::Block;
use crate::AppState;

// --- POST /blocks/:id ---

pub async fn block(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Block>>> {
    let block = state.engine.block(user.id, target_id)?;
    Ok(Json(ApiResponse::ok(block)))
}

// --- DELETE /blocks/:id ---

pub async fn unblock(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.engine.unblock(user.id, target_id)?;
    Ok(Json(ApiResponse::ok_with_message((), "user unblocked")))
}

// --- GET /blocks ---

pub async fn list_blocked(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<Block>>>> {
    Ok(Json(ApiResponse::ok(state.engine.list_blocked(user.id)?)))
}
