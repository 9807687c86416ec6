//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use orgtree_core::error::DomainError;

use crate::response::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Domain(err) if err.is_validation() => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Domain(err) if err.is_conflict() => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Domain(err) if err.is_not_found() => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Domain(err) if matches!(err.root(), DomainError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT")
            }
            ApiError::Domain(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
            match status {
                StatusCode::GATEWAY_TIMEOUT => "Operation timed out".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            tracing::warn!("Request rejected: {}", self);
            self.to_string()
        };

        (status, Json(ApiResponse::<()>::error(code, &message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status(err: DomainError) -> StatusCode {
        ApiError::from(err).status_and_code().0
    }

    #[test]
    fn test_domain_errors_map_to_status() {
        let id = Uuid::new_v4();
        assert_eq!(status(DomainError::InvalidTenantId), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(DomainError::DuplicateCrmRoles {
                crm_role_ids: vec!["A".to_string()],
                group_id: id
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(DomainError::GroupNotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(DomainError::Timeout("5000ms".to_string()).context("sync_groups", id)),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(DomainError::HierarchyCycle(vec![id])),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_database_error_is_internal() {
        let response = ApiError::from(DomainError::DatabaseError("password leaked".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
