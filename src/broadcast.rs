// src/broadcast.rs
//! Live-update fanout.
//!
//! `PollHub` keeps the poll id → connection mapping for every open WebSocket.
//! Each connection registers an outbound channel once, then joins and leaves
//! polls; dropping the connection removes it from every poll it joined.
//! Delivery is best-effort: a full or closed outbound queue drops the update
//! for that connection only.
//!
//! Votes only add, so a poll's total never decreases. Snapshots are published
//! after the store commits, and two concurrent votes can reach the hub in the
//! opposite order; the hub remembers the highest total pushed per poll and
//! drops any snapshot below it, so viewers always end on the newest tallies.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::PollSnapshot;

pub type ConnectionId = u64;

/// Polls a single connection may watch at once.
pub const MAX_POLLS_PER_CONNECTION: usize = 16;

/// Frames pushed to WebSocket clients.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    PollUpdate {
        poll: PollSnapshot,
    },
    Ack {
        action: String,
        #[serde(rename = "pollId")]
        poll_id: String,
    },
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Only strings and integers inside, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Receives committed poll snapshots.
pub trait Publisher: Send + Sync + 'static {
    /// Returns the number of connections the update was queued for.
    fn publish(&self, snapshot: &PollSnapshot) -> usize;
}

struct Connection {
    sender: mpsc::Sender<String>,
    polls: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    rooms: HashMap<String, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, Connection>,
    high_water: HashMap<String, i64>,
}

impl Registry {
    fn remove_from_room(&mut self, poll_id: &str, conn: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(poll_id) {
            members.remove(&conn);
            if members.is_empty() {
                self.rooms.remove(poll_id);
            }
        }
    }
}

#[derive(Default)]
pub struct PollHub {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl PollHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's outbound queue.
    pub fn connect(&self, sender: mpsc::Sender<String>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut registry) = self.registry.lock() {
            registry.connections.insert(
                id,
                Connection {
                    sender,
                    polls: HashSet::new(),
                },
            );
        }
        debug!("Connection {id} registered");
        id
    }

    /// Returns false if the connection is unknown or already watches
    /// [`MAX_POLLS_PER_CONNECTION`] other polls.
    pub fn join(&self, conn: ConnectionId, poll_id: &str) -> bool {
        let Ok(mut registry) = self.registry.lock() else {
            return false;
        };
        let Some(connection) = registry.connections.get_mut(&conn) else {
            return false;
        };
        if !connection.polls.contains(poll_id)
            && connection.polls.len() >= MAX_POLLS_PER_CONNECTION
        {
            warn!("Connection {conn} hit the watch limit, refused poll {poll_id}");
            return false;
        }
        connection.polls.insert(poll_id.to_string());
        registry
            .rooms
            .entry(poll_id.to_string())
            .or_default()
            .insert(conn);

        debug!("Connection {conn} joined poll {poll_id}");
        true
    }

    /// Returns whether the connection was watching the poll.
    pub fn leave(&self, conn: ConnectionId, poll_id: &str) -> bool {
        let Ok(mut registry) = self.registry.lock() else {
            return false;
        };
        let was_joined = registry
            .connections
            .get_mut(&conn)
            .map(|c| c.polls.remove(poll_id))
            .unwrap_or(false);
        if was_joined {
            registry.remove_from_room(poll_id, conn);
            debug!("Connection {conn} left poll {poll_id}");
        }
        was_joined
    }

    pub fn disconnect(&self, conn: ConnectionId) {
        let Ok(mut registry) = self.registry.lock() else {
            return;
        };
        if let Some(connection) = registry.connections.remove(&conn) {
            for poll_id in &connection.polls {
                registry.remove_from_room(poll_id, conn);
            }
        }
        debug!("Connection {conn} removed");
    }

    pub fn subscriber_count(&self, poll_id: &str) -> usize {
        self.registry
            .lock()
            .ok()
            .and_then(|r| r.rooms.get(poll_id).map(HashSet::len))
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.registry
            .lock()
            .map(|r| r.connections.len())
            .unwrap_or(0)
    }
}

impl Publisher for PollHub {
    fn publish(&self, snapshot: &PollSnapshot) -> usize {
        let frame = ServerMessage::PollUpdate {
            poll: snapshot.clone(),
        }
        .to_json();

        let Ok(mut registry) = self.registry.lock() else {
            return 0;
        };

        let total = snapshot.total_votes();
        let newest = registry.high_water.entry(snapshot.id.clone()).or_insert(total);
        if total < *newest {
            debug!(
                "Skipped stale update for poll {} ({total} < {})",
                snapshot.id, *newest
            );
            return 0;
        }
        *newest = total;

        let Some(members) = registry.rooms.get(&snapshot.id) else {
            return 0;
        };

        let mut delivered = 0;
        for conn in members {
            let Some(connection) = registry.connections.get(conn) else {
                continue;
            };
            match connection.sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Connection {conn} is lagging, dropped update for poll {}", snapshot.id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Connection {conn} closed before update for poll {}", snapshot.id);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PollOption;

    fn snapshot(id: &str, votes: i64) -> PollSnapshot {
        PollSnapshot {
            id: id.to_string(),
            question: "Best color?".to_string(),
            options: vec![
                PollOption {
                    text: "Red".to_string(),
                    votes,
                },
                PollOption::new("Blue"),
            ],
        }
    }

    fn connection(hub: &PollHub) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (hub.connect(tx), rx)
    }

    #[test]
    fn publish_reaches_only_joined_connections() {
        let hub = PollHub::new();
        let (a, mut rx_a) = connection(&hub);
        let (b, mut rx_b) = connection(&hub);
        assert!(hub.join(a, "p"));
        assert!(hub.join(b, "q"));

        assert_eq!(hub.publish(&snapshot("p", 1)), 1);

        let frame: serde_json::Value = serde_json::from_str(&rx_a.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "pollUpdate");
        assert_eq!(frame["poll"]["id"], "p");
        assert_eq!(frame["poll"]["options"][0]["votes"], 1);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn leave_stops_delivery() {
        let hub = PollHub::new();
        let (a, mut rx) = connection(&hub);
        hub.join(a, "p");
        assert!(hub.leave(a, "p"));
        assert!(!hub.leave(a, "p"));

        assert_eq!(hub.publish(&snapshot("p", 1)), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count("p"), 0);
    }

    #[test]
    fn disconnect_leaves_every_poll() {
        let hub = PollHub::new();
        let (a, _rx_a) = connection(&hub);
        let (b, _rx_b) = connection(&hub);
        hub.join(a, "p");
        hub.join(a, "q");
        hub.join(b, "p");

        hub.disconnect(a);

        assert_eq!(hub.subscriber_count("p"), 1);
        assert_eq!(hub.subscriber_count("q"), 0);
        assert_eq!(hub.connection_count(), 1);
        assert!(!hub.join(a, "p"));
    }

    #[test]
    fn full_queue_drops_without_blocking_others() {
        let hub = PollHub::new();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let slow = hub.connect(slow_tx);
        let (fast, mut fast_rx) = connection(&hub);
        hub.join(slow, "p");
        hub.join(fast, "p");

        assert_eq!(hub.publish(&snapshot("p", 1)), 2);
        assert_eq!(hub.publish(&snapshot("p", 2)), 1);

        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_ok());
    }

    #[test]
    fn stale_snapshot_is_not_pushed() {
        let hub = PollHub::new();
        let (a, mut rx) = connection(&hub);
        hub.join(a, "p");

        assert_eq!(hub.publish(&snapshot("p", 2)), 1);
        assert_eq!(hub.publish(&snapshot("p", 1)), 0);
        assert_eq!(hub.publish(&snapshot("p", 3)), 1);

        let totals: Vec<i64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|frame| {
                let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
                frame["poll"]["options"][0]["votes"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(totals, vec![2, 3]);
    }

    #[test]
    fn stale_snapshot_is_dropped_even_before_anyone_watches() {
        let hub = PollHub::new();
        assert_eq!(hub.publish(&snapshot("p", 4)), 0);

        let (a, mut rx) = connection(&hub);
        hub.join(a, "p");
        assert_eq!(hub.publish(&snapshot("p", 3)), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn watch_limit_per_connection() {
        let hub = PollHub::new();
        let (a, _rx) = connection(&hub);
        for i in 0..MAX_POLLS_PER_CONNECTION {
            assert!(hub.join(a, &format!("poll-{i}")));
        }

        assert!(!hub.join(a, "one-too-many"));
        assert_eq!(hub.subscriber_count("one-too-many"), 0);
        assert!(hub.join(a, "poll-0"));

        assert!(hub.leave(a, "poll-0"));
        assert!(hub.join(a, "one-too-many"));
    }

    #[test]
    fn joining_twice_is_one_subscription() {
        let hub = PollHub::new();
        let (a, mut rx) = connection(&hub);
        hub.join(a, "p");
        hub.join(a, "p");

        assert_eq!(hub.subscriber_count("p"), 1);
        assert_eq!(hub.publish(&snapshot("p", 3)), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
