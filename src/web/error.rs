use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::quiz::QuizError;
use crate::sessions::SessionError;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl From<SessionError> for WebError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Quiz(QuizError::Validation(msg)) => WebError::BadRequest(msg),
            SessionError::Quiz(QuizError::InvalidState(msg)) => WebError::Conflict(msg),
            SessionError::Repository(e) => WebError::Upstream(e.to_string()),
            SessionError::Closed(id) => WebError::SessionNotFound(id),
            SessionError::ManagerUnavailable => {
                WebError::InternalServerError("Session manager is not running".to_string())
            }
        }
    }
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            WebError::Conflict(_) => StatusCode::CONFLICT,
            WebError::Upstream(_) => StatusCode::BAD_GATEWAY,
            WebError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            WebError::BadRequest(msg) | WebError::Conflict(msg) => msg.clone(),
            WebError::SessionNotFound(id) => format!("Session {} not found", id),
            WebError::Upstream(msg) => format!("Backend unavailable: {}", msg),
            WebError::InternalServerError(msg) => msg.clone(),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T, E = WebError> = std::result::Result<T, E>;
