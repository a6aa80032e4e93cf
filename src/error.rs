//! Error taxonomy: service errors with stable wire codes and their HTTP mapping.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{auth::AuthError, dao::storage::StorageError, state::lifecycle::InvalidTransition};

/// Errors that can occur in session engine operations.
///
/// Every variant maps to a stable machine-readable code sent to clients, so
/// the socket protocol never leaks internal wording changes.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No live room exists for the given code.
    #[error("room `{0}` not found")]
    RoomNotFound(String),
    /// The referenced quiz does not exist in the store.
    #[error("quiz `{0}` not found")]
    QuizNotFound(Uuid),
    /// The caller lacks the authority for a host-only action.
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    /// The room is at capacity.
    #[error("room `{0}` is full")]
    RoomFull(String),
    /// The quiz already started and late joining is disabled.
    #[error("room `{0}` is closed to late joiners")]
    RoomClosedToLateJoin(String),
    /// The room is not in the `active` status.
    #[error("session is not active")]
    SessionNotActive,
    /// The referenced question is not the one currently open.
    #[error("question {0} is not active")]
    QuestionNotActive(usize),
    /// The caller has no playing participant record in the room.
    #[error("not a participant of this room")]
    NotAParticipant,
    /// An answer for this question was already recorded for the caller.
    #[error("answer for question {0} already recorded")]
    DuplicateAnswer(usize),
    /// Room code generation exceeded its retry cap.
    #[error("failed to allocate a unique room code after {0} attempts")]
    CodeGenerationExhausted(u32),
    /// The requested room status change is not valid.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The client token could not be resolved to an identity.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The external store failed during an operation.
    #[error("upstream failure")]
    Upstream(#[from] StorageError),
    /// The room worker has already shut down.
    #[error("room is shutting down")]
    RoomClosed,
}

impl ServiceError {
    /// Stable error code carried by `error` events on the socket.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::RoomNotFound(_) => "room-not-found",
            ServiceError::QuizNotFound(_) => "quiz-not-found",
            ServiceError::NotAuthorized(_) => "not-authorized",
            ServiceError::RoomFull(_) => "room-full",
            ServiceError::RoomClosedToLateJoin(_) => "late-join-disabled",
            ServiceError::SessionNotActive => "session-not-active",
            ServiceError::QuestionNotActive(_) => "question-not-active",
            ServiceError::NotAParticipant => "not-a-participant",
            ServiceError::DuplicateAnswer(_) => "duplicate-answer",
            ServiceError::CodeGenerationExhausted(_) => "code-generation-exhausted",
            ServiceError::InvalidTransition(_) => "invalid-state",
            ServiceError::InvalidInput(_) => "invalid-input",
            ServiceError::Auth(_) => "unauthenticated",
            ServiceError::Upstream(_) => "upstream-failure",
            ServiceError::RoomClosed => "room-closed",
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RoomNotFound(_) | ServiceError::QuizNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            ServiceError::NotAuthorized(_) | ServiceError::Auth(_) => {
                AppError::Unauthorized(err.to_string())
            }
            ServiceError::RoomFull(_)
            | ServiceError::RoomClosedToLateJoin(_)
            | ServiceError::SessionNotActive
            | ServiceError::QuestionNotActive(_)
            | ServiceError::NotAParticipant
            | ServiceError::DuplicateAnswer(_)
            | ServiceError::InvalidTransition(_) => AppError::Conflict(err.to_string()),
            ServiceError::InvalidInput(_) => AppError::BadRequest(err.to_string()),
            ServiceError::CodeGenerationExhausted(_)
            | ServiceError::Upstream(_)
            | ServiceError::RoomClosed => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
