//! Reverb Session - sessions, queues, and the async event processor
//!
//! This crate runs the synchronization engine's session layer on tokio:
//! - `Session` and the token-keyed session store
//! - `Handlers`: the handler registry, with single-step and multi-step
//!   handler traits and the per-step mutation context
//! - The event processor: per-session FIFO, serialized handler steps,
//!   flush-and-push after every step, rollback on failure
//! - `Engine`: the boundary the transport and UI layers consume
//! - `SessionArchive`: the seam for process-shared session persistence
//!
//! ## Session state machine
//!
//! A session is Idle or Processing exactly one event. Handlers may
//! suspend between steps on external work; other sessions are unaffected
//! because isolation is per-session, never global. Deltas reach the
//! transport in the order their flushes were produced.

mod config;
mod engine;
mod error;
mod handler;
mod processor;
mod session;
mod stats;
mod store;

pub use config::{EngineConfig, StoreBackend};
pub use engine::Engine;
pub use error::{Error, Result};
pub use handler::{EventHandler, FnHandler, HandlerRun, StepContext, StepOutcome};
pub use session::{Handlers, Session};
pub use stats::EngineStats;
pub use store::{MemoryArchive, SessionArchive};
