//! Stored session records.

use crate::error::{Error, Result};
use chrono::Utc;
use native_db::*;
use native_model::{native_model, Model};
use reverb_core::{SessionToken, TreeSnapshot};
use serde::{Deserialize, Serialize};

/// One session's checkpoint in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredSession {
    /// Primary key - the session token.
    #[primary_key]
    pub token: String,
    /// JSON-encoded tree snapshot.
    ///
    /// JSON rather than a binary codec: field values serialize untagged,
    /// which needs a self-describing format to decode.
    pub tree: Vec<u8>,
    /// Unix timestamp of the last checkpoint.
    pub updated_at: i64,
}

impl StoredSession {
    /// Encode a checkpoint for a token.
    pub fn from_snapshot(token: &SessionToken, snapshot: &TreeSnapshot) -> Result<Self> {
        let tree =
            serde_json::to_vec(snapshot).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self {
            token: token.as_str().to_string(),
            tree,
            updated_at: Utc::now().timestamp(),
        })
    }

    /// Decode the stored snapshot.
    pub fn to_snapshot(&self) -> Result<TreeSnapshot> {
        serde_json::from_slice(&self.tree).map_err(|e| Error::Serialization(e.to_string()))
    }
}
