use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use masset_api::routes;
use masset_api::state::AppState;
use masset_core::config::{
    AppConfig, CacheConfig, CompletionConfig, DatabaseConfig, EmbeddingConfig, LimiterConfig,
    ServerConfig, VectorStoreConfig,
};
use masset_core::limiter::AdmissionController;
use masset_pipeline::{PipelineOutcome, QueryEngine};

/// Build a test `AppConfig` with safe defaults and no external services.
pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
        },
        limiter: LimiterConfig {
            max_concurrent: 10,
            queue_timeout: Duration::from_secs(5),
        },
        database: DatabaseConfig { url: None },
        completion: CompletionConfig {
            server_url: "http://localhost:8000/v1".to_string(),
            model_name: "test-model".to_string(),
            api_key: "EMPTY".to_string(),
            temperature: 0.0,
        },
        embedding: EmbeddingConfig {
            base_url: "http://localhost:11434".to_string(),
            model: "test-embed".to_string(),
        },
        vector_store: VectorStoreConfig {
            url: "http://localhost:8080".to_string(),
            enabled: false,
            schema_collection: "schema".to_string(),
            sample_collection: "samples".to_string(),
            min_connections: 0,
            max_connections: 2,
            connection_lifetime: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(60),
            checkout_timeout: Duration::from_secs(1),
        },
        cache: CacheConfig {
            enabled: false,
            ttl: Duration::from_secs(3600),
            max_entries: 16,
        },
        max_text_to_sql_retries: 3,
    }
}

/// Scripted [`QueryEngine`] double: sleeps for `delay`, then returns a clone
/// of the configured outcome.
pub struct StubEngine {
    pub delay: Duration,
    pub outcome: PipelineOutcome,
}

impl StubEngine {
    /// An engine that instantly answers every question successfully.
    pub fn success() -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: PipelineOutcome {
                success: true,
                generated_sql: Some("SELECT 42;".to_string()),
                result: Some("[{\"answer\":42}]".to_string()),
                error_message: None,
                answer: "The answer is 42.".to_string(),
                retry_count: 1,
            },
        }
    }

    /// A successful engine that holds its admission slot for `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::success()
        }
    }
}

#[async_trait]
impl QueryEngine for StubEngine {
    async fn run(&self, _question: &str) -> PipelineOutcome {
        tokio::time::sleep(self.delay).await;
        self.outcome.clone()
    }
}

/// Build the full application router with all middleware layers, a stub
/// engine, and no database or vector pool.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses.
pub fn build_test_app(
    limiter: Arc<AdmissionController>,
    engine: Option<Arc<dyn QueryEngine>>,
) -> Router {
    let config = test_config();

    let state = AppState {
        config: Arc::new(config),
        limiter,
        engine,
        db: None,
        vector_pool: None,
        tracing_initialized: true,
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::router())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// App with default limiter and an instantly-successful stub engine.
pub fn default_test_app() -> Router {
    let limiter = AdmissionController::new(10, Duration::from_secs(5));
    build_test_app(limiter, Some(Arc::new(StubEngine::success())))
}

/// Issue a GET request against the app.
pub async fn get(app: Router, path: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Issue a POST request with a JSON body against the app.
pub async fn post_json(app: Router, path: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
