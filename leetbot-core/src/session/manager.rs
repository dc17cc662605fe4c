//! Conversation history manager
//!
//! Mediates every read and write of session turns and assembles the bounded
//! context sent to the completion provider.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::SessionStore;
use super::types::{Role, SessionSnapshot, StoredHistory, Turn};

/// Owns session lookups, appends and context assembly over an injected store
#[derive(Clone)]
pub struct HistoryManager {
    store: Arc<dyn SessionStore>,
    system_prompt: String,
}

/// Full persisted history of one session
#[derive(Debug, Clone)]
pub struct History {
    pub turns: Vec<Turn>,
    pub degraded: Option<String>,
}

impl HistoryManager {
    pub fn new(store: Arc<dyn SessionStore>, system_prompt: impl Into<String>) -> Self {
        Self {
            store,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Mint a fresh session identifier (random 128-bit UUIDv4)
    pub fn mint_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Resolve a caller-supplied session id.
    ///
    /// Absent, blank or unknown ids get a freshly minted id and an empty
    /// history. Known ids return the stored history read during resolution.
    pub async fn resolve_session(&self, session_id: Option<&str>) -> crate::Result<SessionSnapshot> {
        let requested = session_id.filter(|id| !id.trim().is_empty());

        if let Some(id) = requested {
            if let Some(stored) = self.store.get(id).await? {
                return Ok(SessionSnapshot {
                    id: id.to_string(),
                    turns: stored.turns,
                    is_new: false,
                    degraded: stored.degraded,
                });
            }
            debug!(requested = %id, "Unknown session id; minting a new one");
        }

        Ok(SessionSnapshot {
            id: Self::mint_session_id(),
            turns: Vec::new(),
            is_new: true,
            degraded: None,
        })
    }

    /// Append a single user or assistant turn, creating the session if needed
    pub async fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        text: impl Into<String>,
    ) -> crate::Result<()> {
        if role == Role::System {
            return Err(crate::Error::Validation(
                "system turns are never persisted".to_string(),
            ));
        }
        self.store
            .append(session_id, &[Turn::new(role, text)])
            .await?;
        Ok(())
    }

    /// Commit a user turn and its assistant reply as one store update
    pub async fn commit_exchange(&self, session_id: &str, user: Turn, assistant: Turn) -> crate::Result<()> {
        self.store.append(session_id, &[user, assistant]).await?;
        Ok(())
    }

    /// System turn followed by the last `window_size` stored turns
    pub async fn build_context(&self, session_id: &str, window_size: usize) -> crate::Result<Vec<Turn>> {
        let turns = self
            .store
            .get(session_id)
            .await?
            .map(|stored| stored.turns)
            .unwrap_or_default();
        Ok(build_context_from(&self.system_prompt, &turns, window_size))
    }

    /// Remove the session; clearing an unknown session succeeds
    pub async fn clear_session(&self, session_id: &str) -> crate::Result<()> {
        self.store.delete(session_id).await?;
        debug!(session_id = %session_id, "Session cleared");
        Ok(())
    }

    /// Full stored history; `NotFound` when the store has no record
    pub async fn get_history(&self, session_id: &str) -> crate::Result<History> {
        let StoredHistory { turns, degraded } = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("session {}", session_id)))?;

        if let Some(reason) = &degraded {
            warn!(session_id = %session_id, %reason, "Serving degraded history");
        }
        Ok(History { turns, degraded })
    }
}

/// Pure trailing-window truncation: the system turn, then the most recent
/// `window_size` turns of `turns` in their original order.
pub fn build_context_from(system_prompt: &str, turns: &[Turn], window_size: usize) -> Vec<Turn> {
    let start = turns.len().saturating_sub(window_size);
    let mut context = Vec::with_capacity(turns.len() - start + 1);
    context.push(Turn::system(system_prompt));
    context.extend_from_slice(&turns[start..]);
    context
}
