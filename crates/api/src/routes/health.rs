use std::collections::BTreeMap;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Per-dependency status: `healthy`, `not_initialized`, or `error`.
    pub components: BTreeMap<&'static str, &'static str>,
}

/// GET /health -- per-dependency status report.
///
/// Deliberately does not go through the admission controller: health probes
/// must answer even when every query slot is occupied.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut components = BTreeMap::new();

    let database = match &state.db {
        Some(pool) => match masset_db::health_check(pool).await {
            Ok(()) => "healthy",
            Err(_) => "error",
        },
        None => "not_initialized",
    };
    components.insert("database", database);

    components.insert(
        "vector_store",
        if state.vector_pool.is_some() {
            "healthy"
        } else {
            "not_initialized"
        },
    );

    components.insert(
        "tracing",
        if state.tracing_initialized {
            "healthy"
        } else {
            "not_initialized"
        },
    );

    let status = if database == "error" { "degraded" } else { "healthy" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        components,
    })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
