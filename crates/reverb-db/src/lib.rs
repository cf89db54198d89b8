//! Reverb DB - session archive over native_db
//!
//! Implements the session layer's [`SessionArchive`] seam against an
//! embedded key/value database: one versioned record per token holding a
//! JSON-encoded tree snapshot. Use it when sessions must survive a
//! process restart, or behind an external lock when several worker
//! processes share one archive.
//!
//! [`SessionArchive`]: reverb_session::SessionArchive

mod archive;
mod error;
mod models;

pub use archive::DbArchive;
pub use error::{Error, Result};
pub use models::StoredSession;
