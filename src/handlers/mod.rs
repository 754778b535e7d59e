use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::lifecycle::LifecycleError;
use crate::store::StoreError;

pub mod controller;
pub mod monitor;
pub mod orchestrator;
pub mod play;
pub mod sla;
pub mod slice;

/// Handler-facing error: one place maps component failures onto HTTP status
/// codes, with a plain-text diagnostic body.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Upstream(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, message).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("record not found".to_string()),
            StoreError::BadId(id) => AppError::BadRequest(format!("invalid id {:?}", id)),
            StoreError::Timeout => AppError::Upstream("store operation timed out".to_string()),
            StoreError::Database(e) => AppError::Upstream(format!("store failure: {}", e)),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Conflict(id) => {
                AppError::Conflict(format!("slice {} already exists", id))
            }
            LifecycleError::NotFound(id) => AppError::NotFound(format!("slice {} not found", id)),
            LifecycleError::BadInput(msg) => AppError::BadRequest(msg),
            // A render failure is a template/logic defect, not a dependency
            // being down.
            LifecycleError::RenderFailure(e) => AppError::Internal(format!("render: {}", e)),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let resp = AppError::from(StoreError::NotFound).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = AppError::from(StoreError::BadId("x".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::from(StoreError::Timeout).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_lifecycle_error_mapping() {
        let resp = AppError::from(LifecycleError::Conflict("1-000001".to_string()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = AppError::from(LifecycleError::NotFound("1-000001".to_string()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
