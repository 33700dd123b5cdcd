// models.rs
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PollError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub text: String,
    pub votes: i64,
}

impl PollOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            votes: 0,
        }
    }
}

/// Authoritative poll record, voter addresses included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub voter_addresses: HashSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    pub fn has_voted(&self, voter: &str) -> bool {
        self.voter_addresses.contains(voter)
    }

    pub fn total_votes(&self) -> i64 {
        self.options.iter().map(|o| o.votes).sum()
    }

    /// Checks and applies a single vote. Nothing is mutated on error.
    pub fn apply_vote(&mut self, option_index: usize, voter: &str) -> Result<(), PollError> {
        if option_index >= self.options.len() {
            return Err(PollError::InvalidOption);
        }
        if self.voter_addresses.contains(voter) {
            return Err(PollError::AlreadyVoted);
        }

        self.options[option_index].votes += 1;
        self.voter_addresses.insert(voter.to_string());
        Ok(())
    }

    pub fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            id: self.id.clone(),
            question: self.question.clone(),
            options: self.options.clone(),
        }
    }

    pub fn view_for(&self, voter: &str) -> PollView {
        PollView {
            id: self.id.clone(),
            question: self.question.clone(),
            options: self.options.clone(),
            has_voted: self.has_voted(voter),
            created_at: self.created_at,
        }
    }
}

/// Public tallies pushed to viewers and returned after a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
}

impl PollSnapshot {
    pub fn total_votes(&self) -> i64 {
        self.options.iter().map(|o| o.votes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub has_voted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreatePollRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollResponse {
    pub success: bool,
    pub poll_id: String,
    pub share_link: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub option_index: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub success: bool,
    pub poll: PollSnapshot,
}
