//! Volatile in-process session store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::store::{SessionStore, StoreResult};
use super::types::{StoredHistory, Turn};

/// Keeps sessions in a map owned by the store instance
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Turn>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently held
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, session_id: &str) -> StoreResult<Option<StoredHistory>> {
        Ok(self
            .sessions
            .read()
            .get(session_id)
            .map(|turns| StoredHistory::new(turns.clone())))
    }

    async fn append(&self, session_id: &str, turns: &[Turn]) -> StoreResult<()> {
        self.sessions
            .write()
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(turns);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        self.sessions.write().remove(session_id);
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
