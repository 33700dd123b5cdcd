// src/tracker.rs
//! Device-local memory of which polls this client has voted on.
//!
//! Purely advisory: it lets a client show results instead of the voting form,
//! while the server still checks every vote it receives. Backed by a JSON file
//! when a path is given, otherwise kept in memory.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

#[derive(Debug, Default)]
pub struct VoteTracker {
    path: Option<PathBuf>,
    voted: BTreeSet<String>,
}

impl VoteTracker {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the record at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let voted = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring corrupt vote record {}: {e}", path.display());
                BTreeSet::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                warn!("Failed to read vote record {}: {e}", path.display());
                BTreeSet::new()
            }
        };

        Self {
            path: Some(path),
            voted,
        }
    }

    pub fn has_voted(&self, poll_id: &str) -> bool {
        self.voted.contains(poll_id)
    }

    /// Remembers the poll and persists the record if file-backed.
    pub fn mark_voted(&mut self, poll_id: &str) -> io::Result<()> {
        if !self.voted.insert(poll_id.to_string()) {
            return Ok(());
        }
        self.save()
    }

    fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = serde_json::to_string(&self.voted)?;
        fs::write(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_tracker_remembers_votes() {
        let mut tracker = VoteTracker::in_memory();
        assert!(!tracker.has_voted("p"));
        tracker.mark_voted("p").unwrap();
        assert!(tracker.has_voted("p"));
        assert!(!tracker.has_voted("q"));
    }

    #[test]
    fn record_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.json");

        let mut tracker = VoteTracker::open(&path);
        tracker.mark_voted("abc123def456").unwrap();

        let reopened = VoteTracker::open(&path);
        assert!(reopened.has_voted("abc123def456"));
    }

    #[test]
    fn corrupt_record_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.json");
        fs::write(&path, "{not json").unwrap();

        let mut tracker = VoteTracker::open(&path);
        assert!(!tracker.has_voted("p"));

        tracker.mark_voted("p").unwrap();
        assert!(VoteTracker::open(&path).has_voted("p"));
    }
}
