use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{ErrorCode, TaskhubError};
use crate::output::json;

/// Handler error: a `TaskhubError` rendered as the JSON error envelope.
#[derive(Debug)]
pub struct ApiError(pub TaskhubError);

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError | ErrorCode::BadRequest | ErrorCode::BadIdentifier => {
            StatusCode::BAD_REQUEST
        }
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::DatabaseError | ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TaskhubError> for ApiError {
    fn from(e: TaskhubError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(TaskhubError::bad_request("body", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(TaskhubError::bad_request("query", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(TaskhubError::bad_request("id", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code);
        let body = if status.is_server_error() {
            // Internal detail stays in the log.
            tracing::error!(error = %self.0, "request failed");
            json::error(&TaskhubError::database("An internal error occurred"))
        } else {
            json::error(&self.0)
        };
        (status, Json(body)).into_response()
    }
}
