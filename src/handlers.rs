// handlers.rs
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::PollError;
use crate::guard::VoterAddress;
use crate::models::{CreatePollRequest, CreatePollResponse, PollView, VoteRequest, VoteResponse};
use crate::poll::PollStore;
use crate::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

/// Create a poll and hand back its share link
pub async fn create_poll<S: PollStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    payload: Result<Json<CreatePollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatePollResponse>), PollError> {
    let Json(request) = payload.map_err(|e| PollError::Validation(e.body_text()))?;

    let question = request.question.unwrap_or_default();
    let options = request.options.unwrap_or_default();
    let poll = state.guard.create(&question, &options).await?;

    let share_link = share_link(&state.config, &headers, &poll.id);
    Ok((
        StatusCode::CREATED,
        Json(CreatePollResponse {
            success: true,
            poll_id: poll.id,
            share_link,
        }),
    ))
}

/// Fetch a poll, flagging whether the caller's address already voted
pub async fn get_poll<S: PollStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    voter: VoterAddress,
) -> Result<Json<PollView>, PollError> {
    let view = state.guard.fetch(&id, &voter).await?;
    Ok(Json(view))
}

/// Vote on a poll
pub async fn vote<S: PollStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    voter: VoterAddress,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteResponse>, PollError> {
    let option_index = payload.ok().and_then(|Json(request)| request.option_index);
    let poll = state.guard.cast(&id, option_index, &voter).await?;

    Ok(Json(VoteResponse {
        success: true,
        poll,
    }))
}

/// `<base>/poll/<id>`, where the base is `PUBLIC_URL` or derived from the
/// request's forwarded protocol and `Host` header.
pub fn share_link(config: &Config, headers: &HeaderMap, poll_id: &str) -> String {
    let base = match &config.public_url {
        Some(url) => url.clone(),
        None => {
            let proto = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("http");
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| format!("localhost:{}", config.port));
            format!("{proto}://{host}")
        }
    };

    format!("{base}/poll/{poll_id}")
}
