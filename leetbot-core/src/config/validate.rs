//! Configuration validation rules.

use super::schema::{Config, StoreBackend};

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push("server.host must not be empty".to_string());
    }

    if config.chat.system_prompt.trim().is_empty() {
        errors.push("chat.system_prompt must not be empty".to_string());
    }
    if config.chat.window_size == 0 {
        errors.push("chat.window_size must be > 0".to_string());
    }

    if config.provider.model.trim().is_empty() {
        errors.push("provider.model must not be empty".to_string());
    }
    if config.provider.max_tokens == 0 {
        errors.push("provider.max_tokens must be > 0".to_string());
    }
    if !(0.0..=2.0).contains(&config.provider.temperature) {
        errors.push("provider.temperature must be in [0.0, 2.0]".to_string());
    }
    if config.provider.timeout_secs == Some(0) {
        errors.push("provider.timeout_secs must be > 0 when set".to_string());
    }

    match config.store.backend {
        StoreBackend::Memory => {}
        StoreBackend::File => {
            if config.store.path.trim().is_empty() {
                errors.push("store.path is required for the file backend".to_string());
            }
        }
        StoreBackend::Sqlite => {
            if config.store.database_url.trim().is_empty() {
                errors.push("store.database_url is required for the sqlite backend".to_string());
            }
        }
        StoreBackend::Redis => {
            if config.store.redis_url.trim().is_empty() {
                errors.push("store.redis_url is required for the redis backend".to_string());
            }
            if config.store.ttl_secs == 0 {
                errors.push("store.ttl_secs must be > 0 for the redis backend".to_string());
            }
            if config.store.redis_timeout_ms == 0 {
                errors.push("store.redis_timeout_ms must be > 0 for the redis backend".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
