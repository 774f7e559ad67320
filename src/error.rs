use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use thiserror::Error;

/// Every way a requested operation can be refused.
///
/// All variants leave stored state unchanged: the operation's transaction is
/// dropped (and so rolled back) before the error reaches the caller.
#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("The requested record was not found.")]
    NotFound,

    #[error("Invalid enrollment key. Please check with your instructor.")]
    InvalidKey,

    #[error("You have already requested enrollment for this course.")]
    AlreadyRequested,

    #[error("Course is full. No more enrollments accepted.")]
    CourseFull,

    #[error("Access denied.")]
    AccessDenied,

    #[error("Sign-in required: unknown, malformed or deactivated user.")]
    Unauthenticated,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("This enrollment has already been processed.")]
    AlreadyProcessed,

    #[error("Storage error")]
    Storage(#[from] sqlx::Error),

    #[error("Failed to hash enrollment key: {0}")]
    KeyHash(String),
}

pub type Result<T, E = EnrollmentError> = std::result::Result<T, E>;

impl EnrollmentError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EnrollmentError::InvalidArgument(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EnrollmentError::NotFound => StatusCode::NOT_FOUND,
            EnrollmentError::Unauthenticated => StatusCode::UNAUTHORIZED,
            EnrollmentError::InvalidKey | EnrollmentError::AccessDenied => StatusCode::FORBIDDEN,
            EnrollmentError::AlreadyRequested
            | EnrollmentError::CourseFull
            | EnrollmentError::AlreadyProcessed => StatusCode::CONFLICT,
            EnrollmentError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            EnrollmentError::Storage(_) | EnrollmentError::KeyHash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            EnrollmentError::NotFound => "not_found",
            EnrollmentError::InvalidKey => "invalid_key",
            EnrollmentError::AlreadyRequested => "already_requested",
            EnrollmentError::CourseFull => "course_full",
            EnrollmentError::AccessDenied => "access_denied",
            EnrollmentError::Unauthenticated => "unauthenticated",
            EnrollmentError::InvalidArgument(_) => "invalid_argument",
            EnrollmentError::AlreadyProcessed => "already_processed",
            EnrollmentError::Storage(_) => "storage_error",
            EnrollmentError::KeyHash(_) => "internal_error",
        }
    }
}

impl IntoResponse for EnrollmentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            EnrollmentError::Storage(e) => tracing::error!(error=%e, "storage error"),
            EnrollmentError::KeyHash(e) => tracing::error!(error=%e, "key hashing error"),
            _ => tracing::debug!(reason = self.code(), "request refused"),
        }
        let body = serde_json::json!({
            "success": false,
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
