//! Redis-backed session store with expiry.
//!
//! A session is a Redis list of JSON-encoded turns under `{prefix}{session_id}`.
//! Every append refreshes the key's time-to-live in the same MULTI/EXEC block.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::time::Duration;
use tracing::{info, warn};

use super::store::{SessionStore, StoreError, StoreResult};
use super::types::{StoredHistory, Turn};

/// Base delay in milliseconds between reconnect attempts
const RECONNECT_FACTOR_MS: u64 = 10;

/// Connection behaviour for [`RedisSessionStore`]
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub key_prefix: String,
    pub ttl: Duration,
    /// Bounds connecting and each command
    pub timeout: Duration,
    /// Reconnect attempts before an operation fails as unavailable
    pub retries: usize,
}

impl RedisOptions {
    pub fn new(key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ttl,
            timeout: Duration::from_secs(2),
            retries: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    fn manager_config(&self) -> ConnectionManagerConfig {
        ConnectionManagerConfig::new()
            .set_number_of_retries(self.retries)
            .set_factor(RECONNECT_FACTOR_MS)
            .set_max_delay(self.timeout.as_millis() as u64)
            .set_connection_timeout(self.timeout)
            .set_response_timeout(self.timeout)
    }

    /// Upper bound on the initial connect including every retry
    fn connect_deadline(&self) -> Duration {
        self.timeout * (self.retries as u32 + 1) * 2
    }
}

/// Expiring list-per-session store
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error()
            || e.is_connection_refusal()
            || e.is_connection_dropped()
            || e.is_timeout()
        {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

impl RedisSessionStore {
    /// Connect to `url`; an unreachable server fails as `Unavailable`
    /// within a bounded time
    pub async fn connect(url: &str, options: RedisOptions) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(
            options.connect_deadline(),
            client.get_connection_manager_with_config(options.manager_config()),
        )
        .await
        .map_err(|_| {
            StoreError::Unavailable(format!(
                "timed out connecting to {} after {:?}",
                url,
                options.connect_deadline()
            ))
        })??;

        info!(url = %url, ttl_secs = options.ttl.as_secs(), "Redis session store ready");
        Ok(Self {
            conn,
            key_prefix: options.key_prefix,
            ttl: options.ttl,
        })
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    // EXPIRE 0 deletes the key immediately
    ttl.as_secs().max(1) as i64
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, session_id: &str) -> StoreResult<Option<StoredHistory>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key(session_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        // Redis drops empty lists, so an empty reply means no record
        if raw.is_empty() {
            return Ok(None);
        }

        let mut turns = Vec::with_capacity(raw.len());
        for (index, item) in raw.iter().enumerate() {
            match serde_json::from_str::<Turn>(item) {
                Ok(turn) => turns.push(turn),
                Err(e) => {
                    let reason = format!("item {}: {}", index, e);
                    warn!(session_id = %session_id, %reason, "Corrupt session entry; treating history as empty");
                    return Ok(Some(StoredHistory::degraded(reason)));
                }
            }
        }
        Ok(Some(StoredHistory::new(turns)))
    }

    async fn append(&self, session_id: &str, turns: &[Turn]) -> StoreResult<()> {
        if turns.is_empty() {
            return Ok(());
        }
        let payloads = turns
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let key = self.key(session_id);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("RPUSH")
            .arg(&key)
            .arg(&payloads)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs(self.ttl))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(self.key(session_id))
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn expire(&self, session_id: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("EXPIRE")
            .arg(self.key(session_id))
            .arg(ttl_secs(ttl))
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Backend(format!("unexpected PING reply: {}", pong)))
        }
    }
}
