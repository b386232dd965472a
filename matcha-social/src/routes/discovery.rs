use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use matcha_shared::errors::{AppError, AppResult, ErrorCode};
use matcha_shared::types::auth::AuthUser;
use matcha_shared::types::ApiResponse;

use crate::discovery::DiscoveredProfile;
use crate::AppState;

/// `filter` and `sort` may be JSON objects or JSON-encoded strings.
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    pub filter: Option<serde_json::Value>,
    pub sort: Option<serde_json::Value>,
    #[validate(range(min = 1, message = "limit must be positive"))]
    pub limit: Option<i64>,
}

pub async fn search(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> AppResult<Json<ApiResponse<Vec<DiscoveredProfile>>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let profiles = state
        .engine
        .search_profiles(user.id, req.filter.as_ref(), req.sort.as_ref(), req.limit)?;
    Ok(Json(ApiResponse::ok(profiles)))
}
