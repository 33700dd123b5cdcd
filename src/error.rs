// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every way a poll operation can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("{0}")]
    Validation(String),

    #[error("Poll not found")]
    NotFound,

    #[error("Invalid option")]
    InvalidOption,

    #[error("You have already voted on this poll")]
    AlreadyVoted,

    #[error("storage failure: {0}")]
    Storage(String),
}

impl PollError {
    pub fn status(&self) -> StatusCode {
        match self {
            PollError::Validation(_) | PollError::InvalidOption => StatusCode::BAD_REQUEST,
            PollError::NotFound => StatusCode::NOT_FOUND,
            PollError::AlreadyVoted => StatusCode::FORBIDDEN,
            PollError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for PollError {
    fn from(e: sqlx::Error) -> Self {
        PollError::Storage(e.to_string())
    }
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            PollError::AlreadyVoted => json!({ "error": self.to_string(), "hasVoted": true }),
            PollError::Storage(reason) => {
                error!("Storage failure: {reason}");
                json!({ "error": "Internal server error" })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
