//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default system instruction: a hint-giver, not a solution generator.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful DSA teaching assistant. Provide hints, not direct answers in very short.";

/// Root configuration for leetbot
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Conversation behaviour
    #[serde(default)]
    pub chat: ChatConfig,
    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Session store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Conversation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Fixed system instruction prepended to every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Number of most recent stored turns sent as context
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Hold a per-session lock from history read to commit
    #[serde(default)]
    pub serialize_sessions: bool,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_window_size() -> usize {
    10
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            window_size: default_window_size(),
            serialize_sessions: false,
        }
    }
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry name of the provider (groq, openai, openrouter, deepseek, custom)
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// Model identifier sent to the provider
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    /// Overrides the registry's default API base
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub extra_headers: Option<HashMap<String, String>>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout; the HTTP client default applies when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_provider_name() -> String {
    "groq".to_string()
}

fn default_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            model: default_model(),
            api_key: String::new(),
            api_base: None,
            extra_headers: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: None,
        }
    }
}

/// Which session store backs the history manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory; lost on restart
    #[default]
    Memory,
    /// One JSONL document per session on disk
    File,
    /// SQLite database
    Sqlite,
    /// Redis list per session with expiry
    Redis,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreBackend::Memory => "memory",
            StoreBackend::File => "file",
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Redis => "redis",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Sessions directory for the file backend
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Connection URL for the sqlite backend
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Connection URL for the redis backend
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Key prefix for the redis backend
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Time-to-live since last write for the redis backend
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Connect and per-command timeout for the redis backend
    #[serde(default = "default_redis_timeout_ms")]
    pub redis_timeout_ms: u64,
    /// Reconnect attempts before a redis command fails as unavailable
    #[serde(default = "default_redis_retries")]
    pub redis_retries: usize,
}

fn default_store_path() -> String {
    "~/.leetbot/sessions".to_string()
}

fn default_database_url() -> String {
    "sqlite://~/.leetbot/sessions.db".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "leetbot:session:".to_string()
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_redis_timeout_ms() -> u64 {
    2_000
}

fn default_redis_retries() -> usize {
    1
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            database_url: default_database_url(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            ttl_secs: default_ttl_secs(),
            redis_timeout_ms: default_redis_timeout_ms(),
            redis_retries: default_redis_retries(),
        }
    }
}
