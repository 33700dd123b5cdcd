// src/memory.rs
//! In-memory poll store.
//!
//! Each poll sits behind its own mutex, so votes on one poll serialize on the
//! membership check while votes on other polls proceed independently. The
//! outer map lock is only held long enough to look up or insert a poll.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::debug;

use crate::error::PollError;
use crate::models::{Poll, PollOption};
use crate::poll::{generate_poll_id, NewPoll, PollStore};

#[derive(Default)]
pub struct MemoryPollStore {
    polls: RwLock<HashMap<String, Arc<Mutex<Poll>>>>,
}

impl MemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.polls.read().map(|polls| polls.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &str) -> Result<Arc<Mutex<Poll>>, PollError> {
        let polls = self.polls.read().map_err(poisoned)?;
        polls.get(id).cloned().ok_or(PollError::NotFound)
    }
}

fn poisoned<T>(_: T) -> PollError {
    PollError::Storage("poll store lock poisoned".to_string())
}

impl PollStore for MemoryPollStore {
    async fn create(&self, new_poll: NewPoll) -> Result<Poll, PollError> {
        let mut polls = self.polls.write().map_err(poisoned)?;

        loop {
            let id = generate_poll_id();
            if let Entry::Vacant(slot) = polls.entry(id.clone()) {
                let poll = Poll {
                    id,
                    question: new_poll.question,
                    options: new_poll.options.into_iter().map(PollOption::new).collect(),
                    voter_addresses: HashSet::new(),
                    created_at: Utc::now(),
                };
                slot.insert(Arc::new(Mutex::new(poll.clone())));
                debug!("Stored poll {}", poll.id);
                return Ok(poll);
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Poll, PollError> {
        let entry = self.entry(id)?;
        let poll = entry.lock().map_err(poisoned)?;
        Ok(poll.clone())
    }

    async fn record_vote(
        &self,
        id: &str,
        option_index: usize,
        voter: &str,
    ) -> Result<Poll, PollError> {
        let entry = self.entry(id)?;
        let mut poll = entry.lock().map_err(poisoned)?;
        poll.apply_vote(option_index, voter)?;
        Ok(poll.clone())
    }
}
