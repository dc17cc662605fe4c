//! Session management for conversation history
//!
//! A session is an ordered list of user/assistant turns keyed by an opaque
//! id. The [`HistoryManager`] reads and appends turns through any
//! [`SessionStore`] backend and builds the bounded context for each request.

pub mod file;
pub mod manager;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod types;

pub use file::FileSessionStore;
pub use manager::{build_context_from, History, HistoryManager};
pub use memory::MemorySessionStore;
#[cfg(feature = "redis")]
pub use self::redis::{RedisOptions, RedisSessionStore};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;
pub use store::{open_store, SessionStore, StoreError, StoreResult};
pub use types::{Role, SessionSnapshot, StoredHistory, Turn};
