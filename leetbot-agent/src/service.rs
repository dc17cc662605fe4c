//! Chat turn orchestration
//!
//! One chat call: resolve the session, window the history plus the new user
//! turn, make one provider call, then commit the user/assistant pair in a
//! single store update. A failed provider call persists nothing.

use leetbot_core::config::Config;
use leetbot_core::session::{build_context_from, HistoryManager, StoreError, Turn};
use leetbot_core::utils::truncate;
use leetbot_providers::{messages_from_turns, LLMProvider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::locks::SessionLocks;

/// Error type for chat operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// Missing or empty user input
    #[error("{0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

impl From<leetbot_core::Error> for ChatError {
    fn from(e: leetbot_core::Error) -> Self {
        use leetbot_core::Error;
        match e {
            Error::Store(e) => ChatError::Store(e),
            Error::NotFound(what) => ChatError::NotFound(what),
            Error::Validation(msg) => ChatError::Validation(msg),
            other => ChatError::Internal(other.to_string()),
        }
    }
}

/// Per-request knobs taken from configuration
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Stored turns (plus the new user turn) sent as context
    pub window_size: usize,
    /// `None` uses the provider's default model
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Serialize concurrent calls on the same session
    pub serialize_sessions: bool,
}

impl ChatSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window_size: config.chat.window_size,
            model: Some(config.provider.model.clone()).filter(|m| !m.is_empty()),
            max_tokens: config.provider.max_tokens,
            temperature: config.provider.temperature,
            serialize_sessions: config.chat.serialize_sessions,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of a successful chat call
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub session_id: String,
    pub user_input: String,
    pub assistant_response: String,
    /// True when the session id was minted for this call
    pub new_session: bool,
    /// Set when the prior history could not be decoded and was ignored
    pub warning: Option<String>,
}

/// Drives chat calls against a history manager and a provider
pub struct ChatService {
    history: HistoryManager,
    provider: Arc<dyn LLMProvider>,
    settings: ChatSettings,
    locks: SessionLocks,
}

impl ChatService {
    pub fn new(history: HistoryManager, provider: Arc<dyn LLMProvider>, settings: ChatSettings) -> Self {
        Self {
            history,
            provider,
            settings,
            locks: SessionLocks::new(),
        }
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Run one chat turn.
    ///
    /// Without `serialize_sessions`, concurrent calls on one session may
    /// read the same prior history; each pair is still committed atomically
    /// but the relative order of the two pairs is undefined.
    pub async fn chat(&self, message: &str, session_id: Option<&str>) -> ChatResult<ChatReply> {
        if message.trim().is_empty() {
            return Err(ChatError::Validation("Message field is required".to_string()));
        }

        let _guard = match session_id.filter(|id| !id.trim().is_empty()) {
            Some(id) if self.settings.serialize_sessions => Some(self.locks.lock(id).await),
            _ => None,
        };

        let snapshot = self.history.resolve_session(session_id).await?;
        let session_id = snapshot.id;
        if let Some(reason) = &snapshot.degraded {
            warn!(session_id = %session_id, %reason, "Prior history unreadable; continuing with empty context");
        }

        info!(
            session_id = %session_id,
            new_session = snapshot.is_new,
            prior_turns = snapshot.turns.len(),
            "Processing message: {}",
            truncate(message, 80)
        );

        let user_turn = Turn::user(message);
        let mut working = snapshot.turns;
        working.push(user_turn.clone());

        let context = build_context_from(
            self.history.system_prompt(),
            &working,
            self.settings.window_size,
        );
        debug!(session_id = %session_id, context_len = context.len(), "Context assembled");

        let response = self
            .provider
            .chat(
                messages_from_turns(&context),
                self.settings.model.clone(),
                self.settings.max_tokens,
                self.settings.temperature,
            )
            .await
            .and_then(|response| response.into_text());

        let assistant_text = match response {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Provider call failed; nothing persisted");
                return Err(e.into());
            }
        };

        self.history
            .commit_exchange(&session_id, user_turn, Turn::assistant(assistant_text.clone()))
            .await?;

        Ok(ChatReply {
            session_id,
            user_input: message.to_string(),
            assistant_response: assistant_text,
            new_session: snapshot.is_new,
            warning: snapshot
                .degraded
                .map(|reason| format!("previous history was unreadable and was ignored: {}", reason)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leetbot_core::session::{
        FileSessionStore, MemorySessionStore, Role, SessionStore, StoreResult, StoredHistory,
    };
    use leetbot_providers::{LLMResponse, Message, ProviderResult};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Replies with a canned hint and records every request it sees
    struct ScriptedProvider {
        reply: Option<String>,
        delay: Duration,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<Vec<Message>> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn chat(
            &self,
            messages: Vec<Message>,
            _model: Option<String>,
            _max_tokens: u32,
            _temperature: f32,
        ) -> ProviderResult<LLMResponse> {
            self.calls.lock().push(messages);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Some(text) => Ok(LLMResponse {
                    content: Some(text.clone()),
                    finish_reason: "stop".to_string(),
                    usage: HashMap::new(),
                }),
                None => Err(ProviderError::ApiError("HTTP 503: upstream down".to_string())),
            }
        }

        fn get_default_model(&self) -> String {
            "scripted".to_string()
        }
    }

    /// A store whose backend is down
    struct DownStore;

    #[async_trait]
    impl SessionStore for DownStore {
        fn backend(&self) -> &'static str {
            "down"
        }
        async fn get(&self, _: &str) -> StoreResult<Option<StoredHistory>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn append(&self, _: &str, _: &[Turn]) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn delete(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn health_check(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn service_with(
        store: Arc<dyn SessionStore>,
        provider: Arc<ScriptedProvider>,
        settings: ChatSettings,
    ) -> ChatService {
        ChatService::new(HistoryManager::new(store, "hints only"), provider, settings)
    }

    fn settings(window_size: usize) -> ChatSettings {
        ChatSettings {
            window_size,
            ..ChatSettings::default()
        }
    }

    #[tokio::test]
    async fn test_first_message_mints_session_and_stores_pair() {
        let provider = Arc::new(ScriptedProvider::replying("Consider a hash map."));
        let service = service_with(Arc::new(MemorySessionStore::new()), provider.clone(), settings(10));

        let reply = service
            .chat("What's a good approach for two-sum?", None)
            .await
            .unwrap();

        assert!(reply.new_session);
        assert_eq!(reply.user_input, "What's a good approach for two-sum?");
        assert_eq!(reply.assistant_response, "Consider a hash map.");
        assert!(reply.warning.is_none());

        let history = service.history().get_history(&reply.session_id).await.unwrap();
        let roles: Vec<_> = history.turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], Message::system("hints only"));
        assert_eq!(calls[0][1], Message::user("What's a good approach for two-sum?"));
    }

    #[tokio::test]
    async fn test_unknown_session_id_is_replaced() {
        let provider = Arc::new(ScriptedProvider::replying("hint"));
        let service = service_with(Arc::new(MemorySessionStore::new()), provider, settings(10));

        let reply = service.chat("hello", Some("stale-id")).await.unwrap();
        assert_ne!(reply.session_id, "stale-id");
        assert!(reply.new_session);

        let again = service.chat("more", Some(&reply.session_id)).await.unwrap();
        assert_eq!(again.session_id, reply.session_id);
        assert!(!again.new_session);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_without_provider_call() {
        let provider = Arc::new(ScriptedProvider::replying("hint"));
        let service = service_with(Arc::new(MemorySessionStore::new()), provider.clone(), settings(10));

        let err = service.chat("   ", None).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert_eq!(err.to_string(), "Message field is required");
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_persists_nothing() {
        let memory = Arc::new(MemorySessionStore::new());
        let store: Arc<dyn SessionStore> = memory.clone();
        let ok = service_with(store.clone(), Arc::new(ScriptedProvider::replying("hint")), settings(10));
        let first = ok.chat("first", None).await.unwrap();

        let failing = service_with(store.clone(), Arc::new(ScriptedProvider::failing()), settings(10));
        let err = failing.chat("second", Some(&first.session_id)).await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(_)));
        assert!(err.to_string().contains("upstream down"));

        let history = ok.history().get_history(&first.session_id).await.unwrap();
        assert_eq!(history.turns.len(), 2);
        assert_eq!(history.turns[0].content, "first");

        // A failing first message never creates the session either
        let err = failing.chat("orphan?", None).await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(_)));
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_fifteen_messages_window_of_ten() {
        let provider = Arc::new(ScriptedProvider::replying("hint"));
        let service = service_with(Arc::new(MemorySessionStore::new()), provider.clone(), settings(10));

        let mut session_id: Option<String> = None;
        for i in 0..15 {
            let reply = service
                .chat(&format!("message {}", i), session_id.as_deref())
                .await
                .unwrap();
            session_id = Some(reply.session_id);
        }
        let session_id = session_id.unwrap();

        let calls = provider.calls();
        let last = calls.last().unwrap();
        assert_eq!(last.len(), 11);
        assert_eq!(last[0].role, "system");
        assert_eq!(last[10], Message::user("message 14"));
        // The earliest exchanges are gone from the outbound request
        assert!(!last.iter().any(|m| m.content == "message 0"));
        assert!(!last.iter().any(|m| m.content == "message 9"));
        assert!(last.iter().any(|m| m.content == "message 10"));

        let history = service.history().get_history(&session_id).await.unwrap();
        assert_eq!(history.turns.len(), 30);
    }

    #[tokio::test]
    async fn test_store_unavailable_is_not_empty_history() {
        let provider = Arc::new(ScriptedProvider::replying("hint"));
        let service = service_with(Arc::new(DownStore), provider.clone(), settings(10));

        let err = service.chat("hi", Some("s")).await.unwrap_err();
        assert!(matches!(err, ChatError::Store(StoreError::Unavailable(_))));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_history_is_reported_and_replaced() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("broken.jsonl"), "{{{{").unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(temp_dir.path()));

        let provider = Arc::new(ScriptedProvider::replying("hint"));
        let service = service_with(store, provider.clone(), settings(10));

        let reply = service.chat("hello", Some("broken")).await.unwrap();
        assert_eq!(reply.session_id, "broken");
        assert!(reply.warning.unwrap().contains("unreadable"));
        assert_eq!(provider.calls()[0].len(), 2);

        let history = service.history().get_history("broken").await.unwrap();
        assert!(history.degraded.is_none());
        assert_eq!(history.turns.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_calls_race_without_serialization() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let provider = Arc::new(ScriptedProvider::replying("hint").with_delay(Duration::from_millis(30)));
        let service = service_with(store, provider.clone(), settings(100));
        let seed = service.chat("seed", None).await.unwrap().session_id;

        let (a, b) = tokio::join!(
            service.chat("left", Some(&seed)),
            service.chat("right", Some(&seed))
        );
        a.unwrap();
        b.unwrap();

        // Both calls read the same prior history
        let calls = provider.calls();
        assert_eq!(calls[1].len(), calls[2].len());

        // Each pair still lands intact
        let turns = service.history().get_history(&seed).await.unwrap().turns;
        assert_eq!(turns.len(), 6);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
    }

    #[tokio::test]
    async fn test_serialized_sessions_see_each_other() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let provider = Arc::new(ScriptedProvider::replying("hint").with_delay(Duration::from_millis(30)));
        let service = service_with(
            store,
            provider.clone(),
            ChatSettings {
                serialize_sessions: true,
                ..settings(100)
            },
        );
        let seed = service.chat("seed", None).await.unwrap().session_id;

        let (a, b) = tokio::join!(
            service.chat("left", Some(&seed)),
            service.chat("right", Some(&seed))
        );
        a.unwrap();
        b.unwrap();

        let calls = provider.calls();
        let mut lens = [calls[1].len(), calls[2].len()];
        lens.sort();
        // system + seed pair + own turn, then the same plus the other's pair
        assert_eq!(lens, [4, 6]);
    }
}
