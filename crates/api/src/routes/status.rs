use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use masset_core::limiter::ConcurrencyStatus;

use crate::state::AppState;

/// GET / -- service banner.
async fn root() -> Json<Value> {
    Json(json!({
        "message": "m-asset text-to-SQL API server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// GET /concurrency/status -- admission controller counters.
async fn concurrency_status(State(state): State<AppState>) -> Json<ConcurrencyStatus> {
    Json(state.limiter.status())
}

/// GET /status -- system status overview for operators.
async fn system_status(State(state): State<AppState>) -> Json<Value> {
    let vector_pool = state.vector_pool.as_ref().map(|pool| pool.stats());

    Json(json!({
        "system": "m-asset text-to-SQL",
        "status": "running",
        "config": {
            "max_concurrent_requests": state.config.limiter.max_concurrent,
            "queue_timeout_secs": state.config.limiter.queue_timeout.as_secs(),
            "max_retries": state.config.max_text_to_sql_retries,
            "vector_store_enabled": state.config.vector_store.enabled,
        },
        "database": {
            "connected": state.db.is_some(),
        },
        "vector_pool": vector_pool,
        "concurrency": state.limiter.status(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/concurrency/status", get(concurrency_status))
        .route("/status", get(system_status))
}
