use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use masset_api::{routes, state::AppState};
use masset_core::config::{AppConfig, ServerConfig};
use masset_core::limiter::AdmissionController;
use masset_core::services::ContextRetriever;
use masset_llm::{HttpCompletionClient, HttpEmbedder, SqlCache};
use masset_pipeline::{Pipeline, QueryEngine};
use masset_vector::{
    DisabledRetriever, PoolConfig, ResourcePool, Retriever, VectorConnectionFactory,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "masset_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = AppConfig::from_env();
    tracing::info!(host = %config.server.host, port = config.server.port, "Loaded server configuration");

    // --- Admission control ---
    let limiter = AdmissionController::new(
        config.limiter.max_concurrent,
        config.limiter.queue_timeout,
    );

    // --- Database (optional) ---
    let db = match &config.database.url {
        Some(url) => {
            let pool = masset_db::create_pool(url)
                .await
                .expect("Failed to connect to database");
            masset_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database connection pool created");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; queries will be rejected until configured");
            None
        }
    };

    // --- Vector-search connection pool (optional) ---
    let vector_pool = if config.vector_store.enabled {
        let factory = VectorConnectionFactory::new(config.vector_store.url.clone());
        let pool = ResourcePool::start(factory, PoolConfig::from(&config.vector_store)).await;
        tracing::info!("Vector-search connection pool started");
        Some(pool)
    } else {
        tracing::info!("Vector store disabled via configuration");
        None
    };

    // --- Pipeline ---
    let engine: Option<Arc<dyn QueryEngine>> = db.clone().map(|pool| {
        let completion = HttpCompletionClient::new(config.completion.clone());
        let embedder = Arc::new(HttpEmbedder::new(config.embedding.clone()));
        let retriever: Arc<dyn ContextRetriever> = match &vector_pool {
            Some(vector_pool) => Arc::new(Retriever::new(
                Arc::clone(vector_pool),
                embedder,
                &config.vector_store,
            )),
            None => Arc::new(DisabledRetriever),
        };
        let store = masset_db::PgSqlStore::new(pool);
        let cache = SqlCache::new(&config.cache);
        Arc::new(Pipeline::new(
            completion,
            retriever,
            store,
            cache,
            config.max_text_to_sql_retries,
        )) as Arc<dyn QueryEngine>
    });
    if engine.is_some() {
        tracing::info!("Text-to-SQL pipeline initialized");
    }

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        limiter,
        engine,
        db: db.clone(),
        vector_pool: vector_pool.clone(),
        tracing_initialized: true,
    };

    // --- CORS ---
    let cors = build_cors_layer(&config.server);

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        .merge(routes::router())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout; generous because a queued query may legitimately
        // wait most of the admission timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.server.host.parse().expect("Invalid HOST address"),
        config.server.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    if let Some(pool) = vector_pool {
        pool.shutdown().await;
        tracing::info!("Vector-search connection pool shut down");
    }

    if let Some(pool) = db {
        pool.close().await;
        tracing::info!("Database connection pool closed");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
