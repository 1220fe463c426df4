//! API error handling
//!
//! Maps the service error taxonomy onto HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::Error;

pub struct ApiError(pub Error);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::PipelineNotFound(_) | Error::JobNotFound(_) | Error::JobDeleted(_) => {
                StatusCode::NOT_FOUND
            }
            Error::PipelineExists(_) => StatusCode::CONFLICT,
            Error::NotAuthorized { .. } | Error::NotClusterAdmin => StatusCode::FORBIDDEN,
            Error::Validation(_) | Error::EmptyInput(_) | Error::ParentInputsMismatch(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Error::Cafs(_)
            | Error::AuthNotActivated
            | Error::TransientRpc(_)
            | Error::Unavailable { .. }
            | Error::Invariant(_) => {
                tracing::error!("internal error: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
