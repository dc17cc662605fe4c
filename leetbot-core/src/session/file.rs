//! File-backed session store
//!
//! Each session is one JSONL document: a metadata header line followed by
//! one line per turn. Writes replace the whole document via a temp file and
//! rename, so readers never observe a half-written session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::store::{SessionStore, StoreResult};
use super::types::{StoredHistory, Turn};
use crate::utils::safe_file_stem;

const METADATA_TYPE: &str = "metadata";

/// Stores sessions as JSONL files under a directory
#[derive(Debug)]
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

/// A decoded session document
struct Document {
    created_at: DateTime<Utc>,
    history: StoredHistory,
}

impl FileSessionStore {
    pub fn new<P: AsRef<Path>>(sessions_dir: P) -> Self {
        Self {
            sessions_dir: sessions_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Get the file path for a session
    fn session_path(&self, key: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.jsonl", safe_file_stem(key)))
    }

    async fn load(&self, key: &str) -> StoreResult<Option<Document>> {
        let path = self.session_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(parse_document(key, &content)))
    }

    async fn save(&self, key: &str, created_at: DateTime<Utc>, turns: &[Turn]) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.sessions_dir).await?;

        let metadata = serde_json::json!({
            "_type": METADATA_TYPE,
            "session_id": key,
            "created_at": created_at.to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });
        let mut lines = Vec::with_capacity(turns.len() + 1);
        lines.push(serde_json::to_string(&metadata)?);
        for turn in turns {
            lines.push(serde_json::to_string(turn)?);
        }

        let path = self.session_path(key);
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, lines.join("\n")).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

fn parse_document(key: &str, content: &str) -> Document {
    let mut turns = Vec::new();
    let mut created_at = None;

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => return corrupt(key, format!("line {}: {}", index + 1, e)),
        };

        if value.get("_type").and_then(|v| v.as_str()) == Some(METADATA_TYPE) {
            created_at = value
                .get("created_at")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok());
            continue;
        }

        match serde_json::from_value::<Turn>(value) {
            Ok(turn) => turns.push(turn),
            Err(e) => return corrupt(key, format!("line {}: {}", index + 1, e)),
        }
    }

    Document {
        created_at: created_at.unwrap_or_else(Utc::now),
        history: StoredHistory::new(turns),
    }
}

fn corrupt(key: &str, reason: String) -> Document {
    warn!(session_id = %key, %reason, "Session file is corrupt; treating history as empty");
    Document {
        created_at: Utc::now(),
        history: StoredHistory::degraded(reason),
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn get(&self, session_id: &str) -> StoreResult<Option<StoredHistory>> {
        Ok(self.load(session_id).await?.map(|doc| doc.history))
    }

    async fn append(&self, session_id: &str, turns: &[Turn]) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let (created_at, mut existing) = match self.load(session_id).await? {
            Some(doc) => (doc.created_at, doc.history.turns),
            None => (Utc::now(), Vec::new()),
        };
        existing.extend_from_slice(turns);

        self.save(session_id, created_at, &existing).await?;
        debug!(session_id = %session_id, turns = existing.len(), "Session file written");
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.session_path(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn health_check(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.sessions_dir).await?;
        let metadata = tokio::fs::metadata(&self.sessions_dir).await?;
        if metadata.permissions().readonly() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is read-only", self.sessions_dir.display()),
            )
            .into());
        }
        Ok(())
    }
}
