// src/guard.rs
//! Vote admission.
//!
//! The store's voter set is the only authority on whether an address may vote.
//! Addresses come from the network origin, which is a weak identity: voters
//! behind one NAT or proxy share an address, and a voter who can rotate
//! addresses can vote again.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use http::request::Parts;
use http::HeaderMap;
use tracing::{debug, info};

use crate::broadcast::Publisher;
use crate::error::PollError;
use crate::models::{Poll, PollSnapshot, PollView};
use crate::poll::{NewPoll, PollStore};

const UNKNOWN_ADDRESS: &str = "unknown";

/// Network origin of the caller, used as the voter token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterAddress(pub String);

impl VoterAddress {
    /// First `X-Forwarded-For` entry, else `X-Real-IP`, else the peer IP.
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let address = forwarded
            .or(real_ip)
            .map(str::to_string)
            .or_else(|| peer.map(|p| p.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());

        Self(address)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for VoterAddress
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::resolve(&parts.headers, peer))
    }
}

pub struct VoteGuard<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
}

impl<S, P> Clone for VoteGuard<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
        }
    }
}

impl<S: PollStore, P: Publisher> VoteGuard<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create(&self, question: &str, options: &[String]) -> Result<Poll, PollError> {
        let new_poll = NewPoll::parse(question, options)?;
        let poll = self.store.create(new_poll).await?;
        info!("Created poll {} with {} options", poll.id, poll.options.len());
        Ok(poll)
    }

    /// Current state of a poll as seen by `voter`.
    pub async fn fetch(&self, id: &str, voter: &VoterAddress) -> Result<PollView, PollError> {
        let poll = self.store.get(id).await?;
        Ok(poll.view_for(voter.as_str()))
    }

    /// Records one vote and fans the new tallies out to the poll's viewers.
    ///
    /// `option_index` is the raw client value; anything that is not a
    /// non-negative index is an invalid option, but an unknown poll is
    /// reported first.
    pub async fn cast(
        &self,
        id: &str,
        option_index: Option<i64>,
        voter: &VoterAddress,
    ) -> Result<PollSnapshot, PollError> {
        let Some(index) = option_index.and_then(|i| usize::try_from(i).ok()) else {
            self.store.get(id).await?;
            return Err(PollError::InvalidOption);
        };

        let poll = match self.store.record_vote(id, index, voter.as_str()).await {
            Ok(poll) => poll,
            Err(PollError::AlreadyVoted) => {
                debug!("Rejected repeat vote on poll {id} from {}", voter.as_str());
                return Err(PollError::AlreadyVoted);
            }
            Err(e) => return Err(e),
        };

        // Concurrent votes may reach here out of commit order; the publisher
        // drops snapshots older than the last one it pushed.
        let snapshot = poll.snapshot();
        let delivered = self.publisher.publish(&snapshot);
        info!(
            "Vote on poll {id} option {index}: {} total, pushed to {delivered} viewers",
            snapshot.total_votes()
        );

        Ok(snapshot)
    }
}
