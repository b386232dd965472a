use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Relationship errors (likes, blocks, visits)
/// - E2xxx: Discovery errors
/// - E3xxx: Chat errors
/// - E4xxx: Notification errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    ServiceUnavailable,
    BadRequest,
    TokenExpired,
    TokenInvalid,

    // Relationships (E1xxx)
    ProfileNotFound,
    CannotInteractWithSelf,
    AlreadyLiked,
    AlreadyDisliked,
    LikeNotFound,
    AlreadyBlocked,
    BlockNotFound,
    NotPermitted,

    // Discovery (E2xxx)
    InvalidFilter,
    InvalidSort,
    LocationRequired,

    // Chat (E3xxx)
    MessageLength,
    MessagingNotAllowed,

    // Notification (E4xxx)
    NotificationNotFound,
}

/// How a caller should react to an error, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    NotPermitted,
    NotFound,
    Unauthenticated,
    Transient,
    Internal,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::ServiceUnavailable => "E0006",
            Self::BadRequest => "E0007",
            Self::TokenExpired => "E0008",
            Self::TokenInvalid => "E0009",

            // Relationships
            Self::ProfileNotFound => "E1001",
            Self::CannotInteractWithSelf => "E1002",
            Self::AlreadyLiked => "E1003",
            Self::AlreadyDisliked => "E1004",
            Self::LikeNotFound => "E1005",
            Self::AlreadyBlocked => "E1006",
            Self::BlockNotFound => "E1007",
            Self::NotPermitted => "E1008",

            // Discovery
            Self::InvalidFilter => "E2001",
            Self::InvalidSort => "E2002",
            Self::LocationRequired => "E2003",

            // Chat
            Self::MessageLength => "E3001",
            Self::MessagingNotAllowed => "E3002",

            // Notification
            Self::NotificationNotFound => "E4001",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError | Self::BadRequest | Self::CannotInteractWithSelf
            | Self::AlreadyLiked | Self::AlreadyDisliked | Self::LikeNotFound
            | Self::AlreadyBlocked | Self::BlockNotFound | Self::InvalidFilter
            | Self::InvalidSort | Self::LocationRequired | Self::MessageLength => ErrorCategory::Validation,
            Self::NotPermitted | Self::MessagingNotAllowed | Self::Forbidden => ErrorCategory::NotPermitted,
            Self::NotFound | Self::ProfileNotFound | Self::NotificationNotFound => ErrorCategory::NotFound,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => ErrorCategory::Unauthenticated,
            Self::ServiceUnavailable => ErrorCategory::Transient,
            Self::InternalError => ErrorCategory::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::ValidationError | Self::BadRequest | Self::CannotInteractWithSelf
            | Self::LikeNotFound | Self::BlockNotFound | Self::InvalidFilter
            | Self::InvalidSort | Self::LocationRequired | Self::MessageLength => StatusCode::BAD_REQUEST,
            Self::AlreadyLiked | Self::AlreadyDisliked | Self::AlreadyBlocked => StatusCode::CONFLICT,
            Self::NotFound | Self::ProfileNotFound | Self::NotificationNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::NotPermitted | Self::MessagingNotAllowed => StatusCode::FORBIDDEN,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_permitted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotPermitted, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The catalogue entry this error maps to on the wire.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Database(diesel::result::Error::NotFound) => ErrorCode::NotFound,
            AppError::Database(_) => ErrorCode::ServiceUnavailable,
            AppError::Validation(_) => ErrorCode::ValidationError,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            AppError::Known { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Message safe to hand back to a client; infrastructure detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Known { message, .. } => message.clone(),
            AppError::Internal(_) => "internal server error".into(),
            AppError::Database(diesel::result::Error::NotFound) => "resource not found".into(),
            AppError::Database(_) => "database error".into(),
            AppError::Validation(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(err) => tracing::error!(error = %err, "internal server error"),
            AppError::Database(err) => tracing::error!(error = %err, "database error"),
            _ => {}
        }

        let code = self.code();
        let mut resp = ApiErrorResponse::new(code.code(), self.public_message());
        if let Some(d) = self.details() {
            resp = resp.with_details(d.clone());
        }

        (code.status_code(), Json(resp)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_and_validation_errors_are_distinct_categories() {
        let blocked = AppError::not_permitted("blocked");
        let duplicate = AppError::new(ErrorCode::AlreadyLiked, "already liked");

        assert_eq!(blocked.category(), ErrorCategory::NotPermitted);
        assert_eq!(duplicate.category(), ErrorCategory::Validation);
        assert_eq!(blocked.code().status_code(), StatusCode::FORBIDDEN);
        assert_eq!(duplicate.code().status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn database_errors_hide_their_cause() {
        let err = AppError::Database(diesel::result::Error::RollbackTransaction);
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert_eq!(err.public_message(), "database error");
    }

    #[test]
    fn details_survive_on_known_errors() {
        let err = AppError::with_details(
            ErrorCode::InvalidFilter,
            "unknown field",
            serde_json::json!({ "field": "height" }),
        );
        assert_eq!(err.details().and_then(|d| d.get("field")).and_then(|f| f.as_str()), Some("height"));
        assert_eq!(err.code().code(), "E2001");
    }
}
