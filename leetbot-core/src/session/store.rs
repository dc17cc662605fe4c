//! Session store contract and backend selection

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::file::FileSessionStore;
use super::memory::MemorySessionStore;
use super::types::{StoredHistory, Turn};
use crate::config::{StoreBackend, StoreConfig};
use crate::utils::expand_home;

/// Error type for session store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached (connection refused, dropped, timed out)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend answered but rejected the operation
    #[error("backend error: {0}")]
    Backend(String),

    /// The requested backend was compiled out
    #[error("store backend not supported in this build: {0}")]
    Unsupported(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence backend for per-session turn sequences.
///
/// `append` must commit every given turn or none of them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short backend name for health reports and logs
    fn backend(&self) -> &'static str;

    /// Fetch the stored turns; `None` when the store has no record
    async fn get(&self, session_id: &str) -> StoreResult<Option<StoredHistory>>;

    /// Append turns in order, creating the session if necessary
    async fn append(&self, session_id: &str, turns: &[Turn]) -> StoreResult<()>;

    /// Remove the session; removing an unknown session is not an error
    async fn delete(&self, session_id: &str) -> StoreResult<()>;

    /// Set a time-to-live on the session. Stores without expiry ignore this.
    async fn expire(&self, _session_id: &str, _ttl: Duration) -> StoreResult<()> {
        Ok(())
    }

    /// Check connectivity to the backend
    async fn health_check(&self) -> StoreResult<()>;
}

/// Build the configured session store
pub async fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemorySessionStore::new())),
        StoreBackend::File => {
            let store = FileSessionStore::new(expand_home(&config.path));
            Ok(Arc::new(store))
        }
        StoreBackend::Sqlite => open_sqlite(config).await,
        StoreBackend::Redis => open_redis(config).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    let url = expand_sqlite_url(&config.database_url);
    let store = super::sqlite::SqliteSessionStore::connect(&url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    Err(StoreError::Unsupported(
        "sqlite (enable the `sqlite` feature)".to_string(),
    ))
}

#[cfg(feature = "redis")]
async fn open_redis(config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    let options = super::redis::RedisOptions::new(
        config.key_prefix.clone(),
        Duration::from_secs(config.ttl_secs),
    )
    .with_timeout(Duration::from_millis(config.redis_timeout_ms))
    .with_retries(config.redis_retries);
    let store = super::redis::RedisSessionStore::connect(&config.redis_url, options).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    Err(StoreError::Unsupported(
        "redis (enable the `redis` feature)".to_string(),
    ))
}

/// Expand `~` inside a `sqlite://` URL
#[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
fn expand_sqlite_url(url: &str) -> String {
    match url.strip_prefix("sqlite://") {
        Some(path) if path.starts_with('~') => {
            format!("sqlite://{}", expand_home(path).display())
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_sqlite_url() {
        assert_eq!(expand_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            expand_sqlite_url("sqlite:///var/lib/leetbot.db"),
            "sqlite:///var/lib/leetbot.db"
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_sqlite_url("sqlite://~/s.db"),
                format!("sqlite://{}", home.join("s.db").display())
            );
        }
    }

    #[tokio::test]
    async fn test_open_memory_and_file_stores() {
        let store = open_store(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.backend(), "memory");

        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::File,
            path: temp_dir.path().to_string_lossy().to_string(),
            ..StoreConfig::default()
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.backend(), "file");
        store.append("s1", &[Turn::user("hi")]).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap().unwrap().turns.len(), 1);
    }
}
