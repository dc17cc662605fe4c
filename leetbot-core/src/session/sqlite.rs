//! SQLite-backed session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row as _, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::store::{SessionStore, StoreError, StoreResult};
use super::types::{Role, StoredHistory, Turn};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS session_turns ( \
    session_id TEXT NOT NULL, \
    seq INTEGER NOT NULL, \
    role TEXT NOT NULL, \
    content TEXT NOT NULL, \
    created_at TEXT NOT NULL, \
    PRIMARY KEY (session_id, seq) \
)";

/// One row per turn, ordered by a per-session sequence number.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

/// How long a writer waits for the database lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLITE_BUSY and SQLITE_LOCKED primary result codes
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(e.to_string())
            }
            sqlx::Error::Database(db) if is_lock_contention(db.code().as_deref()) => {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

/// Extended result codes keep the primary code in the low byte
fn is_lock_contention(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

impl SqliteSessionStore {
    /// Connect to `url`, creating the database file and schema if missing
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self::from_pool(pool).await?;
        info!(url = %url, "SQLite session store ready");
        Ok(store)
    }

    /// Wrap an existing pool and ensure the schema exists
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, String> {
    let role: String = row.try_get("role").map_err(|e| e.to_string())?;
    let content: String = row.try_get("content").map_err(|e| e.to_string())?;
    let created_at: String = row.try_get("created_at").map_err(|e| e.to_string())?;

    let role = Role::from_str(&role)?;
    if role == Role::System {
        return Err("system turn stored in session".to_string());
    }
    let timestamp = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| format!("bad timestamp {:?}: {}", created_at, e))?
        .with_timezone(&Utc);

    Ok(Turn {
        role,
        content,
        timestamp,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, session_id: &str) -> StoreResult<Option<StoredHistory>> {
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM session_turns \
             WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut turns = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_row(row) {
                Ok(turn) => turns.push(turn),
                Err(reason) => {
                    warn!(session_id = %session_id, %reason, "Corrupt session row; treating history as empty");
                    return Ok(Some(StoredHistory::degraded(reason)));
                }
            }
        }
        Ok(Some(StoredHistory::new(turns)))
    }

    async fn append(&self, session_id: &str, turns: &[Turn]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Each statement writes first, so the transaction takes the write lock
        // before it reads MAX(seq) and never needs to upgrade a read snapshot.
        for turn in turns {
            sqlx::query(
                "INSERT INTO session_turns (session_id, seq, role, content, created_at) \
                 SELECT ?, COALESCE(MAX(seq), -1) + 1, ?, ?, ? \
                 FROM session_turns WHERE session_id = ?",
            )
            .bind(session_id)
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(turn.timestamp.to_rfc3339())
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM session_turns WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
