use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use matcha_shared::errors::AppResult;
use matcha_shared::types::auth::AuthUser;
use matcha_shared::types::pagination::{Paginated, PaginationParams};
use matcha_shared::types::ApiResponse;

use crate::models::NotificationView;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

// --- GET /notifications ---

pub async fn list_notifications(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<NotificationView>>>> {
    Ok(Json(ApiResponse::ok(state.engine.list_notifications(user.id, &params)?)))
}

// --- GET /notifications/unread-count ---

pub async fn unread_count(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let count = state.engine.unread_count(user.id)?;
    Ok(Json(ApiResponse::ok(UnreadCountResponse { count })))
}

// --- POST /notifications/:id/read ---

pub async fn mark_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<NotificationView>>> {
    Ok(Json(ApiResponse::ok(state.engine.mark_read(user.id, id)?)))
}

// --- POST /notifications/mark-all-read ---

pub async fn mark_all_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<MarkAllReadResponse>>> {
    let updated = state.engine.mark_all_read(user.id)?;
    Ok(Json(ApiResponse::ok(MarkAllReadResponse { updated })))
}
