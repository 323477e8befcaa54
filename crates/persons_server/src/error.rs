use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use persons_core::{ErrorKind, Interrupt, StoreError};
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

pub const INVALID_ID: &str = "invalid person ID";
pub const PERSON_NOT_FOUND: &str = "person not found";

/// Where a store error surfaced; decides the status of constraint failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Other,
}

/// Error already classified into an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_id() -> Self {
        Self::new(StatusCode::BAD_REQUEST, INVALID_ID)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, PERSON_NOT_FOUND)
    }

    pub fn invalid_person(status: StatusCode, detail: impl std::fmt::Display) -> Self {
        Self::new(
            status,
            format!("cannot parse person from request body: {detail}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Maps a store failure to a response for the given operation.
    pub fn from_store(err: StoreError, operation: Operation) -> Self {
        let status = match (err.kind(), operation) {
            (ErrorKind::Constraint, Operation::Create) => StatusCode::BAD_REQUEST,
            (ErrorKind::Constraint, Operation::Update) => StatusCode::UNPROCESSABLE_ENTITY,
            (ErrorKind::Connectivity, _) => StatusCode::SERVICE_UNAVAILABLE,
            (ErrorKind::Cancelled, _) => match err {
                StoreError::Interrupted(Interrupt::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}
