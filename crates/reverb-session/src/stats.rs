//! Engine counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Internal atomic counters
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub sessions_started: AtomicU64,
    pub sessions_ended: AtomicU64,
    pub events_processed: AtomicU64,
    pub deltas_pushed: AtomicU64,
    pub handler_failures: AtomicU64,
}

impl StatCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_sessions: usize) -> EngineStats {
        EngineStats {
            active_sessions,
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            deltas_pushed: self.deltas_pushed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time view of engine activity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    /// Sessions currently live
    pub active_sessions: usize,
    /// Sessions created since startup
    pub sessions_started: u64,
    /// Sessions retired since startup
    pub sessions_ended: u64,
    /// Events fully processed
    pub events_processed: u64,
    /// Updates delivered to transports
    pub deltas_pushed: u64,
    /// Handler steps that failed and were rolled back
    pub handler_failures: u64,
}
