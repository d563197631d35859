//! Error handling for the backend API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use srs_core::SchedulingError;
use thiserror::Error;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Review not recorded, please retry: {0}")]
    ConcurrentModification(String),

    #[error("Item needs repair, contact support: {0}")]
    CorruptItem(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::InvalidInput(_) | SchedulingError::InvalidConfig(_) => {
                ApiError::BadRequest(err.to_string())
            }
            SchedulingError::NotFound(id) => ApiError::NotFound(format!("item {id}")),
            SchedulingError::InvalidTransition { .. } => ApiError::InvalidTransition(err.to_string()),
            SchedulingError::ConcurrentModification(id) => {
                ApiError::ConcurrentModification(format!("item {id}"))
            }
            SchedulingError::CorruptState { item_id, .. } => {
                ApiError::CorruptItem(format!("item {item_id}"))
            }
            SchedulingError::Storage(msg) => {
                tracing::error!(error = %msg, "storage failure");
                ApiError::Internal("storage unavailable".to_string())
            }
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
            ApiError::ConcurrentModification(_) => (StatusCode::CONFLICT, "concurrent_modification"),
            ApiError::CorruptItem(_) => (StatusCode::UNPROCESSABLE_ENTITY, "corrupt_state"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_invalid_input_is_bad_request() {
        let error: ApiError = SchedulingError::InvalidInput("grade must be between 1 and 4".to_string()).into();
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_config_is_bad_request() {
        let error: ApiError = SchedulingError::InvalidConfig("daily review limit must be positive".to_string()).into();
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_status() {
        let error: ApiError = SchedulingError::NotFound(Uuid::nil()).into();
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_transition_is_conflict() {
        let error: ApiError = SchedulingError::InvalidTransition {
            from: "normal",
            reason: "no special mode is active".to_string(),
        }
        .into();
        assert_eq!(
            error.to_string(),
            "Invalid transition: invalid transition from normal: no special mode is active"
        );
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_concurrent_modification_asks_for_retry() {
        let error: ApiError = SchedulingError::ConcurrentModification(Uuid::nil()).into();
        assert!(error.to_string().starts_with("Review not recorded, please retry"));
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_corrupt_state_hides_details() {
        let error: ApiError = SchedulingError::CorruptState {
            item_id: Uuid::nil(),
            reason: "stability must be positive, got -1".to_string(),
        }
        .into();
        assert!(!error.to_string().contains("stability"));
        assert_eq!(error.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_storage_error_is_internal() {
        let error: ApiError = SchedulingError::Storage("connection reset".to_string()).into();
        assert_eq!(error.to_string(), "Internal error: storage unavailable");
        assert_eq!(error.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
