//! Session store - live sessions and the archive boundary
//!
//! The in-process store maps tokens to live session entries: the tree
//! behind a per-session async mutex (the single-writer lock), the event
//! queue behind a short-lived sync lock, and the outbound channel to the
//! transport. The [`SessionArchive`] trait is the seam for a
//! process-shared backend: implementations persist full tree snapshots
//! keyed by token, written only from the owning session's drain task.

use crate::error::{Error, Result};
use crate::session::Session;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use reverb_core::{Event, SessionToken, TreeSnapshot, Update};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Pluggable persistence for session trees
///
/// `store` is called after each fully processed event; `load` on session
/// start; `remove` on retirement. A token's snapshots are only ever
/// written from that session's own drain task, so implementations need no
/// per-token locking within one process. Deployments sharing an archive
/// across worker processes must serialize access per token externally to
/// keep the single-writer invariant.
pub trait SessionArchive: Send + Sync {
    /// Load the last checkpoint for a token, if one exists
    fn load(&self, token: &SessionToken) -> Result<Option<TreeSnapshot>>;

    /// Persist a checkpoint for a token
    fn store(&self, token: &SessionToken, snapshot: &TreeSnapshot) -> Result<()>;

    /// Drop a token's checkpoint
    fn remove(&self, token: &SessionToken) -> Result<()>;
}

/// In-memory [`SessionArchive`], mainly for tests and single-process use
#[derive(Default)]
pub struct MemoryArchive {
    entries: RwLock<IndexMap<SessionToken, TreeSnapshot>>,
}

impl MemoryArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archived sessions
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the archive is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Check whether a token has a checkpoint
    pub fn contains(&self, token: &SessionToken) -> bool {
        self.entries.read().contains_key(token)
    }
}

impl SessionArchive for MemoryArchive {
    fn load(&self, token: &SessionToken) -> Result<Option<TreeSnapshot>> {
        Ok(self.entries.read().get(token).cloned())
    }

    fn store(&self, token: &SessionToken, snapshot: &TreeSnapshot) -> Result<()> {
        self.entries.write().insert(token.clone(), snapshot.clone());
        Ok(())
    }

    fn remove(&self, token: &SessionToken) -> Result<()> {
        self.entries.write().shift_remove(token);
        Ok(())
    }
}

/// Per-session FIFO plus the processing flag
///
/// The flag is the per-session mutex from the state machine: exactly one
/// drain task runs while it is set.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    pub events: VecDeque<Event>,
    pub processing: bool,
}

impl EventQueue {
    /// Prepend follow-up events ahead of externally queued ones,
    /// preserving their own order
    pub fn push_followups(&mut self, followups: Vec<Event>) {
        for event in followups.into_iter().rev() {
            self.events.push_front(event);
        }
    }
}

/// One live session's bookkeeping
pub(crate) struct SessionEntry {
    /// The session tree behind the single-writer lock
    pub state: Arc<tokio::sync::Mutex<Session>>,
    /// Pending events and the processing flag
    pub queue: Mutex<EventQueue>,
    /// Outbound channel to the transport adapter
    pub outbound: mpsc::UnboundedSender<Update>,
    /// The current drain task, if one is running
    pub task: Mutex<Option<JoinHandle<()>>>,
    /// Last client contact, for TTL expiry
    pub last_seen: Mutex<DateTime<Utc>>,
}

impl SessionEntry {
    pub fn new(session: Session, outbound: mpsc::UnboundedSender<Update>) -> Self {
        Self {
            state: Arc::new(tokio::sync::Mutex::new(session)),
            queue: Mutex::new(EventQueue::default()),
            outbound,
            task: Mutex::new(None),
            last_seen: Mutex::new(Utc::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Utc::now();
    }
}

/// Token-keyed map of live sessions
#[derive(Default)]
pub(crate) struct SessionStore {
    sessions: RwLock<IndexMap<SessionToken, Arc<SessionEntry>>>,
}

impl SessionStore {
    pub fn insert(&self, token: SessionToken, entry: Arc<SessionEntry>) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&token) {
            return Err(Error::SessionExists(token));
        }
        sessions.insert(token, entry);
        Ok(())
    }

    pub fn get(&self, token: &SessionToken) -> Option<Arc<SessionEntry>> {
        self.sessions.read().get(token).cloned()
    }

    pub fn remove(&self, token: &SessionToken) -> Option<Arc<SessionEntry>> {
        self.sessions.write().shift_remove(token)
    }

    pub fn tokens(&self) -> Vec<SessionToken> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_archive_round_trip() {
        let archive = MemoryArchive::new();
        let token = SessionToken::new("t1");
        assert!(archive.load(&token).unwrap().is_none());

        archive.store(&token, &TreeSnapshot::default()).unwrap();
        assert!(archive.contains(&token));
        assert!(archive.load(&token).unwrap().is_some());

        archive.remove(&token).unwrap();
        assert!(archive.is_empty());
    }

    #[test]
    fn test_followups_run_ahead_of_queued_events() {
        let mut queue = EventQueue::default();
        let token = SessionToken::new("t1");
        queue.events.push_back(Event::new(token.clone(), "root.external"));

        queue.push_followups(vec![
            Event::new(token.clone(), "root.first"),
            Event::new(token.clone(), "root.second"),
        ]);

        let order: Vec<_> = queue
            .events
            .iter()
            .map(|e| e.handler.as_str().to_string())
            .collect();
        assert_eq!(order, vec!["root.first", "root.second", "root.external"]);
    }
}
