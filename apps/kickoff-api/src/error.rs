use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Failures produced by the coordinators and the storage layer.
///
/// The `Display` text is what a client sees in a private `error` envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Missing or malformed required fields. Raised before any storage access.
    #[error("{0}")]
    InvalidInput(String),
    #[error("match not found")]
    MatchNotFound,
    #[error("participant does not exist")]
    UnknownParticipant,
    #[error("match is full")]
    CapacityExceeded,
    #[error("participant is already enrolled in this match")]
    DuplicateEnrollment,
    /// Commit failure, lost connection, lock wait exceeded. Not retried here.
    #[error("storage temporarily unavailable, try again")]
    TransientStorage(String),
    /// Malformed envelope or unknown action on the real-time channel.
    #[error("{0}")]
    Protocol(String),
}

impl CoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Short machine-readable code, used in logs and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::MatchNotFound | Self::UnknownParticipant => "NOT_FOUND",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::DuplicateEnrollment => "DUPLICATE_ENROLLMENT",
            Self::TransientStorage(_) => "TRANSIENT_STORAGE_FAILURE",
            Self::Protocol(_) => "PROTOCOL_ERROR",
        }
    }
}

impl From<diesel::result::Error> for CoreError {
    fn from(err: diesel::result::Error) -> Self {
        tracing::error!(?err, "database error");
        Self::TransientStorage(err.to_string())
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for CoreError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::TransientStorage(err.to_string())
    }
}

/// Structured API error returned to HTTP clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn validation(details: Vec<FieldError>) -> Self {
        Self {
            details: Some(details),
            ..Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "Validation failed")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        tracing::error!(?err, "database error");
        Self::internal("An internal error occurred")
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for ApiError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::internal("An internal error occurred")
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::InvalidInput(_) | CoreError::Protocol(_) => StatusCode::BAD_REQUEST,
            CoreError::MatchNotFound | CoreError::UnknownParticipant => StatusCode::NOT_FOUND,
            CoreError::CapacityExceeded | CoreError::DuplicateEnrollment => StatusCode::CONFLICT,
            CoreError::TransientStorage(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_hide_storage_details() {
        let err = CoreError::TransientStorage("deadlock detected on relation matches".into());
        assert_eq!(err.to_string(), "storage temporarily unavailable, try again");
        assert_eq!(ApiError::from(err).status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn capacity_maps_to_conflict() {
        let api = ApiError::from(CoreError::CapacityExceeded);
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, "CAPACITY_EXCEEDED");
    }
}
