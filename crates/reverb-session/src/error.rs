//! Error types for reverb-session

use reverb_core::{NodePath, SessionToken};
use thiserror::Error;

/// Session-layer error type
#[derive(Error, Debug)]
pub enum Error {
    /// A tree or registry operation failed
    #[error(transparent)]
    Core(#[from] reverb_core::Error),

    /// The token does not name a live session
    #[error("unknown session token: {0}")]
    SessionLost(SessionToken),

    /// A session with this token is already live
    #[error("session already started: {0}")]
    SessionExists(SessionToken),

    /// Handler code failed during a step
    #[error("handler failed: {0}")]
    Handler(String),

    /// A handler tried to write a node it is not anchored above
    #[error("write outside handler scope: {0}")]
    OutOfScope(NodePath),

    /// The session archive backend failed
    #[error("archive error: {0}")]
    Archive(String),

    /// Engine wiring does not match the configured backend
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
