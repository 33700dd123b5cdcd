// src/client.rs
//! HTTP client for the poll API.
//!
//! Keeps a [`VoteTracker`] current: a poll is remembered after a confirmed
//! vote, after the server rejects a repeat vote, or when a fetch reports the
//! caller already voted. `vote` refuses locally for remembered polls; the
//! server would reject the request anyway.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::models::{CreatePollResponse, PollSnapshot, PollView, VoteResponse};
use crate::tracker::VoteTracker;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Rejected(String),

    #[error("poll not found")]
    NotFound,

    #[error("invalid option")]
    InvalidOption,

    #[error("already voted on this poll")]
    AlreadyVoted,

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default, rename = "hasVoted")]
    has_voted: bool,
}

pub struct PollClient {
    base_url: String,
    http: reqwest::Client,
    tracker: VoteTracker,
}

impl PollClient {
    pub fn new(base_url: impl Into<String>, tracker: VoteTracker) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            tracker,
        }
    }

    pub fn tracker(&self) -> &VoteTracker {
        &self.tracker
    }

    pub async fn create_poll(
        &self,
        question: &str,
        options: &[&str],
    ) -> Result<CreatePollResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/polls", self.base_url))
            .json(&json!({ "question": question, "options": options }))
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(error_from(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn fetch_poll(&mut self, id: &str) -> Result<PollView, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/polls/{id}", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let view: PollView = response.json().await?;
        if view.has_voted {
            self.remember(id);
        }
        Ok(view)
    }

    pub async fn vote(&mut self, id: &str, option_index: usize) -> Result<PollSnapshot, ClientError> {
        if self.tracker.has_voted(id) {
            return Err(ClientError::AlreadyVoted);
        }

        let response = self
            .http
            .post(format!("{}/api/polls/{id}/vote", self.base_url))
            .json(&json!({ "optionIndex": option_index }))
            .send()
            .await?;

        if !response.status().is_success() {
            let err = error_from(response).await;
            if matches!(err, ClientError::AlreadyVoted) {
                self.remember(id);
            }
            return Err(err);
        }

        let body: VoteResponse = response.json().await?;
        self.remember(id);
        Ok(body.poll)
    }

    fn remember(&mut self, id: &str) {
        if let Err(e) = self.tracker.mark_voted(id) {
            warn!("Failed to persist vote record for poll {id}: {e}");
        }
    }
}

async fn error_from(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.unwrap_or(ErrorBody {
        error: String::new(),
        has_voted: false,
    });

    match status {
        StatusCode::FORBIDDEN if body.has_voted => ClientError::AlreadyVoted,
        StatusCode::NOT_FOUND => ClientError::NotFound,
        StatusCode::BAD_REQUEST if body.error == "Invalid option" => ClientError::InvalidOption,
        StatusCode::BAD_REQUEST => ClientError::Rejected(body.error),
        _ => ClientError::Server {
            status: status.as_u16(),
            message: body.error,
        },
    }
}
