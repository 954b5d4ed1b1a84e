//! API error type and its JSON rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::FieldIssue;
use thiserror::Error;

use crate::api::types::{Envelope, ErrorBody};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed")]
    Validation(Vec<FieldIssue>),

    #[error("upstream timed out: {0}")]
    Timeout(String),

    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Storage(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{} '{}' not found", entity, id))
    }
}

impl From<common::Error> for ApiError {
    fn from(err: common::Error) -> Self {
        use common::Error as E;
        match err {
            E::Validation(issues) => Self::Validation(issues),
            E::NotFound(what) => Self::NotFound(what),
            E::Timeout { .. } => Self::Timeout(err.to_string()),
            E::Durable(_) | E::Live(_) => Self::Storage(err.to_string()),
            E::Json(e) => Self::BadRequest(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::Validation(issues) => serde_json::to_value(issues).ok(),
            _ => None,
        };
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            details,
        };

        tracing::warn!(
            error_code = body.code,
            error_message = %body.message,
            status = %status,
            "API error"
        );

        let envelope: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(body),
        };
        (status, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
