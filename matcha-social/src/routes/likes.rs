use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use matcha_shared::errors::AppResult;
use matcha_shared::types::auth::AuthUser;
use matcha_shared::types::ApiResponse;

use crate::matching::Relationship;
use crate::models::Like;
use crate::AppState;

// --- POST /likes/:id ---

pub async fn like(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Relationship>>> {
    let relationship = state.engine.like(user.id, target_id).await?;
    let message = if relationship.both_matched { "it's a match" } else { "profile liked" };
    Ok(Json(ApiResponse::ok_with_message(relationship, message)))
}

// --- DELETE /likes/:id ---

pub async fn unlike(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Relationship>>> {
    let relationship = state.engine.unlike(user.id, target_id).await?;
    Ok(Json(ApiResponse::ok(relationship)))
}

// --- POST /dislikes/:id ---

pub async fn dislike(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Relationship>>> {
    let relationship = state.engine.dislike(user.id, target_id).await?;
    Ok(Json(ApiResponse::ok(relationship)))
}

/// GET /relationships/:id - current state in both directions
pub async fn relationship(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Relationship>>> {
    Ok(Json(ApiResponse::ok(state.engine.relationship(user.id, target_id)?)))
}

pub async fn list_matches(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<Uuid>>>> {
    Ok(Json(ApiResponse::ok(state.engine.list_matches(user.id)?)))
}

pub async fn list_likers(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<Like>>>> {
    Ok(Json(ApiResponse::ok(state.engine.list_likers(user.id)?)))
}
