//! Database-backed session archive.

use crate::error::{Error, Result};
use crate::models::StoredSession;
use native_db::*;
use reverb_core::{SessionToken, TreeSnapshot};
use reverb_session::SessionArchive;
use std::path::Path;
use std::sync::LazyLock;

// Static models for the database
static MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<StoredSession>().unwrap();
    models
});

/// Session archive over an embedded key/value database.
///
/// The external-backend variant of the session store: the engine
/// checkpoints each session's tree here after every processed event, and
/// restores from the last checkpoint on session start.
pub struct DbArchive {
    db: Database<'static>,
}

impl DbArchive {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new()
            .create(&MODELS, path.as_ref())
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Save a session checkpoint.
    pub fn save(&self, token: &SessionToken, snapshot: &TreeSnapshot) -> Result<()> {
        let stored = StoredSession::from_snapshot(token, snapshot)?;
        let rw = self.db.rw_transaction()?;
        rw.upsert(stored)?;
        rw.commit()?;
        Ok(())
    }

    /// Load a session checkpoint by token.
    pub fn find(&self, token: &SessionToken) -> Result<Option<TreeSnapshot>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredSession> = r.get().primary(token.as_str().to_string())?;
        stored.map(|s| s.to_snapshot()).transpose()
    }

    /// Delete a session checkpoint.
    pub fn delete(&self, token: &SessionToken) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let stored: Option<StoredSession> = rw.get().primary(token.as_str().to_string())?;
        if let Some(s) = stored {
            rw.remove(s)?;
        }
        rw.commit()?;
        Ok(())
    }

    /// Tokens with a stored checkpoint.
    pub fn tokens(&self) -> Result<Vec<SessionToken>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredSession>()?;
        let iter = scan.all()?;
        let sessions: std::result::Result<Vec<StoredSession>, _> = iter.collect();
        let sessions = sessions.map_err(|e| Error::Database(e.to_string()))?;
        Ok(sessions
            .into_iter()
            .map(|s| SessionToken::new(s.token))
            .collect())
    }
}

impl SessionArchive for DbArchive {
    fn load(&self, token: &SessionToken) -> reverb_session::Result<Option<TreeSnapshot>> {
        self.find(token)
            .map_err(|e| reverb_session::Error::Archive(e.to_string()))
    }

    fn store(&self, token: &SessionToken, snapshot: &TreeSnapshot) -> reverb_session::Result<()> {
        self.save(token, snapshot)
            .map_err(|e| reverb_session::Error::Archive(e.to_string()))
    }

    fn remove(&self, token: &SessionToken) -> reverb_session::Result<()> {
        self.delete(token)
            .map_err(|e| reverb_session::Error::Archive(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverb_core::{NodePath, Registry, StateTree, Value};
    use std::sync::Arc;

    fn snapshot() -> TreeSnapshot {
        let mut registry = Registry::new();
        registry.register_node("app").unwrap();
        registry
            .register_field("app", "count", Value::Int(0))
            .unwrap();
        let mut tree = StateTree::new(Arc::new(registry), "app").unwrap();
        tree.write(&NodePath::root(), "count", 7i64).unwrap();
        tree.snapshot().unwrap()
    }

    #[test]
    fn test_save_and_find() {
        let archive = DbArchive::in_memory().unwrap();
        let token = SessionToken::new("t1");
        assert!(archive.find(&token).unwrap().is_none());

        archive.save(&token, &snapshot()).unwrap();
        let restored = archive.find(&token).unwrap().unwrap();
        assert_eq!(
            restored.get(&NodePath::root()).unwrap().fields.get("count"),
            Some(&Value::Int(7))
        );
    }

    #[test]
    fn test_delete() {
        let archive = DbArchive::in_memory().unwrap();
        let token = SessionToken::new("t1");
        archive.save(&token, &snapshot()).unwrap();
        archive.delete(&token).unwrap();
        assert!(archive.find(&token).unwrap().is_none());
    }

    #[test]
    fn test_tokens() {
        let archive = DbArchive::in_memory().unwrap();
        archive.save(&SessionToken::new("a"), &snapshot()).unwrap();
        archive.save(&SessionToken::new("b"), &snapshot()).unwrap();

        let mut tokens = archive.tokens().unwrap();
        tokens.sort();
        assert_eq!(tokens, vec![SessionToken::new("a"), SessionToken::new("b")]);
    }

    #[test]
    fn test_trait_round_trip() {
        let archive = DbArchive::in_memory().unwrap();
        let token = SessionToken::new("t1");
        let snapshot = snapshot();

        SessionArchive::store(&archive, &token, &snapshot).unwrap();
        let loaded = SessionArchive::load(&archive, &token).unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        SessionArchive::remove(&archive, &token).unwrap();
        assert!(SessionArchive::load(&archive, &token).unwrap().is_none());
    }
}
