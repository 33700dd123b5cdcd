// src/poll.rs
//! Poll creation rules and the storage contract every backend implements.

use std::future::Future;

use uuid::Uuid;

use crate::error::PollError;
use crate::models::Poll;

/// Length of a generated poll id (hex characters).
pub const POLL_ID_LEN: usize = 12;

/// Validated input for a new poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
}

impl NewPoll {
    /// Trims the question and every option, drops blank options and requires
    /// at least two to remain. Duplicate option texts are kept as distinct
    /// options.
    pub fn parse(question: &str, options: &[String]) -> Result<Self, PollError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PollError::Validation(
                "Question and at least 2 options are required".to_string(),
            ));
        }

        let options: Vec<String> = options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        if options.len() < 2 {
            return Err(PollError::Validation(
                "Question and at least 2 options are required".to_string(),
            ));
        }

        Ok(Self {
            question: question.to_string(),
            options,
        })
    }
}

/// Short random id used in share links.
pub fn generate_poll_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(POLL_ID_LEN);
    id
}

/// Whether `id` has the shape [`generate_poll_id`] produces.
pub fn is_poll_id(id: &str) -> bool {
    id.len() == POLL_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Persistent poll storage.
///
/// `record_vote` is the only mutation after creation and must perform the
/// membership check, the counter increment and the address insert as one
/// atomic unit per poll.
pub trait PollStore: Send + Sync + 'static {
    fn create(&self, new_poll: NewPoll) -> impl Future<Output = Result<Poll, PollError>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Poll, PollError>> + Send;

    fn record_vote(
        &self,
        id: &str,
        option_index: usize,
        voter: &str,
    ) -> impl Future<Output = Result<Poll, PollError>> + Send;
}
