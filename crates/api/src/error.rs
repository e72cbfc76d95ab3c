//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use feature_codec::ValidationError;
use inference_engine::InferenceError;
use serde::Serialize;
use storage::StorageError;
use thiserror::Error;
use tracing::{debug, error};
use user_auth::AuthError;

use crate::workflow::WorkflowError;

/// Error returned by every handler
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Every problem found in a submitted form
    #[error("Invalid input ({} problems)", .0.len())]
    InvalidInput(Vec<ValidationError>),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Auth(e) => ApiError::Auth(e),
            WorkflowError::Validation(e) => ApiError::Validation(e),
            WorkflowError::Inference(e) => ApiError::Inference(e),
            WorkflowError::Storage(e) => ApiError::Storage(e),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => match e {
                AuthError::UsernameTaken(_) => StatusCode::CONFLICT,
                AuthError::InvalidCredentials | AuthError::NotLoggedIn => StatusCode::UNAUTHORIZED,
                AuthError::Forbidden => StatusCode::FORBIDDEN,
                AuthError::NotFound(_) => StatusCode::NOT_FOUND,
                AuthError::EmptyCredentials => StatusCode::BAD_REQUEST,
                AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Validation(_) | ApiError::InvalidInput(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Inference(e) => match e {
                InferenceError::InvalidArtifact(_) => StatusCode::BAD_REQUEST,
                InferenceError::InvalidInputShape { .. }
                | InferenceError::UnknownClass(_)
                | InferenceError::InferenceFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                InferenceError::ModelLoadError(_) | InferenceError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }

        let details = match &self {
            ApiError::InvalidInput(errors) => errors.iter().map(ToString::to_string).collect(),
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(AuthError::NotLoggedIn).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(AuthError::Forbidden).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(AuthError::UsernameTaken("alice".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ValidationError::MissingField("depression")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(InferenceError::InvalidInputShape {
                expected: 20,
                actual: 18
            })
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(StorageError::Export("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_workflow_errors_keep_their_status() {
        let e = ApiError::from(WorkflowError::Auth(AuthError::NotLoggedIn));
        assert_eq!(e.status(), StatusCode::UNAUTHORIZED);
    }
}
