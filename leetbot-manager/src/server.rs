use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    chat_handler, clear_history_handler, get_history_handler, health_handler, root_handler,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route(
            "/history/:session_id",
            get(get_history_handler).delete(clear_history_handler),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server<F>(state: AppState, host: &str, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Server shutting down signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use leetbot_agent::{ChatService, ChatSettings};
    use leetbot_core::session::{
        FileSessionStore, HistoryManager, MemorySessionStore, SessionStore, StoreError, StoreResult,
        StoredHistory, Turn,
    };
    use leetbot_providers::{LLMProvider, LLMResponse, Message, ProviderError, ProviderResult};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct HintProvider {
        fail: bool,
    }

    #[async_trait]
    impl LLMProvider for HintProvider {
        async fn chat(
            &self,
            messages: Vec<Message>,
            _model: Option<String>,
            _max_tokens: u32,
            _temperature: f32,
        ) -> ProviderResult<LLMResponse> {
            if self.fail {
                return Err(ProviderError::ApiError("HTTP 500: upstream exploded".into()));
            }
            Ok(LLMResponse {
                content: Some(format!("Hint #{}: think about a hash map.", messages.len())),
                finish_reason: "stop".into(),
                usage: HashMap::new(),
            })
        }

        fn get_default_model(&self) -> String {
            "hint".into()
        }
    }

    struct DownStore;

    #[async_trait]
    impl SessionStore for DownStore {
        fn backend(&self) -> &'static str {
            "redis"
        }
        async fn get(&self, _: &str) -> StoreResult<Option<StoredHistory>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn append(&self, _: &str, _: &[Turn]) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn health_check(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn app_with(store: Arc<dyn SessionStore>, fail: bool) -> Router {
        let history = HistoryManager::new(store, "hints only");
        let chat = ChatService::new(
            history,
            Arc::new(HintProvider { fail }),
            ChatSettings::default(),
        );
        build_router(AppState::new(Arc::new(chat)))
    }

    fn app() -> Router {
        app_with(Arc::new(MemorySessionStore::new()), false)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_chat(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_banner() {
        let (status, body) = send(&app(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Welcome to LEETBOT!" }));
    }

    #[tokio::test]
    async fn test_two_sum_chat_then_history() {
        let app = app();
        let (status, body) = send(
            &app,
            post_chat(json!({ "message": "What's a good approach for two-sum?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["user_input"], "What's a good approach for two-sum?");
        assert!(!body["assistant_response"].as_str().unwrap().is_empty());
        assert!(body.get("warning").is_none());

        let session_id = body["session_id"].as_str().unwrap().to_string();
        let (status, history) = send(&app, get(&format!("/history/{}", session_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["session_id"], session_id.as_str());
        let conversation = history["conversation"].as_array().unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0]["role"], "user");
        assert_eq!(conversation[0]["content"], "What's a good approach for two-sum?");
        assert_eq!(conversation[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_follow_up_reuses_session() {
        let app = app();
        let (_, first) = send(&app, post_chat(json!({ "message": "two-sum?" }))).await;
        let session_id = first["session_id"].as_str().unwrap();

        let (status, second) = send(
            &app,
            post_chat(json!({ "message": "and in O(n)?", "session_id": session_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["session_id"], session_id);
        // system + first pair + new user turn
        assert_eq!(second["assistant_response"], "Hint #4: think about a hash map.");
    }

    #[tokio::test]
    async fn test_missing_or_blank_message_is_400() {
        let app = app();
        for body in [json!({}), json!({ "message": "" }), json!({ "message": "   " })] {
            let (status, body) = send(&app, post_chat(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "error": "Message field is required" }));
        }

        let malformed = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message field is required");
    }

    #[tokio::test]
    async fn test_unknown_session_gets_fresh_id() {
        let (status, body) = send(
            &app(),
            post_chat(json!({ "message": "hi", "session_id": "does-not-exist" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["session_id"], "does-not-exist");
    }

    #[tokio::test]
    async fn test_history_of_unknown_session_is_404() {
        let (status, body) = send(&app(), get("/history/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let app = app();
        let (status, body) = send(&app, delete("/history/never-created")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "status": "success", "message": "Conversation history cleared" })
        );

        let (_, chat) = send(&app, post_chat(json!({ "message": "hello" }))).await;
        let uri = format!("/history/{}", chat["session_id"].as_str().unwrap());
        let (status, _) = send(&app, delete(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, delete(&uri)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_provider_failure_is_502_and_history_unchanged() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let healthy = app_with(store.clone(), false);
        let (_, first) = send(&healthy, post_chat(json!({ "message": "first" }))).await;
        let session_id = first["session_id"].as_str().unwrap();

        let broken = app_with(store, true);
        let (status, body) = send(
            &broken,
            post_chat(json!({ "message": "second", "session_id": session_id })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("upstream exploded"));

        let (_, history) = send(&healthy, get(&format!("/history/{}", session_id))).await;
        assert_eq!(history["conversation"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_outage_is_503() {
        let app = app_with(Arc::new(DownStore), false);
        let (status, _) = send(&app, post_chat(json!({ "message": "hi", "session_id": "s" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["store"], "redis");
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let (status, body) = send(&app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "healthy", "store": "memory" }));
    }

    #[tokio::test]
    async fn test_corrupt_history_carries_warning() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("mangled.jsonl"), "not json at all").unwrap();
        let app = app_with(Arc::new(FileSessionStore::new(temp_dir.path())), false);

        let (status, body) = send(&app, get("/history/mangled")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversation"], json!([]));
        assert!(body["warning"].as_str().unwrap().contains("unreadable"));
    }
}
