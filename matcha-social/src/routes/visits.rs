use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use matcha_shared::errors::AppResult;
use matcha_shared::types::auth::AuthUser;
use matcha_shared::types::pagination::{Paginated, PaginationParams};
use matcha_shared::types::ApiResponse;

use crate::models::Visit;
use crate::AppState;

pub async fn record_visit(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(visited_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Visit>>> {
    Ok(Json(ApiResponse::ok(state.engine.record_visit(user.id, visited_id)?)))
}

/// GET /visits - who looked at my profile, newest first
pub async fn list_visitors(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Visit>>>> {
    Ok(Json(ApiResponse::ok(state.engine.list_visitors(user.id, &params)?)))
}
