#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aigpic_api::config::ServerConfig;
use aigpic_api::router::build_app_router;
use aigpic_api::state::AppState;
use aigpic_api::ws::FeedViewers;
use aigpic_core::providers::ProviderRegistry;
use aigpic_events::EventBus;
use aigpic_pipeline::{Orchestrator, OrchestratorConfig, OutputStore};
use aigpic_provider::{GenerationClient, GenerationRequest, ImagePayload, ProviderError};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::ImageFormat;
use sqlx::SqlitePool;
use tower::ServiceExt;

/// Provider configuration shared by the API tests.
pub const PROVIDERS_JSON: &str = r#"{
    "api_configs": [
        {"name": "main", "base_url": "http://main.invalid", "api_key": "sk-main-secret"},
        {"name": "backup", "base_url": "http://backup.invalid", "api_key": "sk-backup-secret",
         "model": "backup-model"}
    ],
    "default": "main",
    "max_concurrent": 2
}"#;

// ---------------------------------------------------------------------------
// Fake provider
// ---------------------------------------------------------------------------

/// Returns `count` tiny PNG payloads after a short delay, or fails if the
/// prompt contains `"fail"`.
pub struct FakeClient {
    registry: Arc<ProviderRegistry>,
    delay: Duration,
}

#[async_trait]
impl GenerationClient for FakeClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImagePayload>, ProviderError> {
        tokio::time::sleep(self.delay).await;
        if request.prompt.contains("fail") {
            return Err(ProviderError::Rejected {
                status: 500,
                body: "upstream exploded".to_string(),
            });
        }
        Ok((0..request.count)
            .map(|i| ImagePayload::new(vec![0x89, b'P', b'N', b'G', i as u8], ImageFormat::Png))
            .collect())
    }

    fn has_config(&self, config_name: &str) -> bool {
        self.registry.resolve(Some(config_name)).is_some()
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` rooted in `dir`.
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8989".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: "sqlite::memory:".to_string(),
        output_dir: dir.join("output"),
        static_dir: dir.join("static"),
        provider_config_path: dir.join("configs.json"),
    }
}

/// Build the full application state with a fake provider and a running
/// orchestrator over `pool`.
pub async fn build_test_state(pool: SqlitePool, dir: &Path) -> AppState {
    let config = test_config(dir);
    std::fs::create_dir_all(&config.static_dir).unwrap();
    std::fs::write(config.static_dir.join("index.html"), "<h1>aigpic</h1>").unwrap();

    let providers = Arc::new(ProviderRegistry::from_json_str(PROVIDERS_JSON).unwrap());
    let client = Arc::new(FakeClient {
        registry: Arc::clone(&providers),
        delay: Duration::from_millis(20),
    });
    let output = OutputStore::new(&config.output_dir);
    output.ensure_dir().await.unwrap();

    let orchestrator = Orchestrator::start(
        pool.clone(),
        client,
        Arc::new(EventBus::default()),
        output.clone(),
        OrchestratorConfig {
            max_concurrent: providers.max_concurrent(),
            ..OrchestratorConfig::default()
        },
    )
    .await
    .unwrap();

    AppState {
        pool,
        config: Arc::new(config),
        orchestrator: Arc::new(orchestrator),
        providers,
        viewers: Arc::new(FeedViewers::new()),
        output,
    }
}

/// Build the full application router with all middleware layers.
///
/// Uses the same `build_app_router` as `main.rs`, so tests exercise the
/// production middleware stack.
pub async fn build_test_app(pool: SqlitePool, dir: &Path) -> Router {
    let state = build_test_state(pool, dir).await;
    let config = Arc::clone(&state.config);
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

/// Poll `GET /api/tasks/{id}` until the job is terminal.
pub async fn wait_for_terminal(app: &Router, task_id: &str) -> serde_json::Value {
    let uri = format!("/api/tasks/{task_id}");
    for _ in 0..250 {
        let job = body_json(get(app.clone(), &uri).await).await;
        if job["status"] == "succeeded" || job["status"] == "failed" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {task_id} did not finish in time");
}
