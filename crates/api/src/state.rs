use std::sync::Arc;

use masset_core::config::AppConfig;
use masset_core::limiter::AdmissionController;
use masset_pipeline::QueryEngine;
use masset_vector::{ResourcePool, VectorConnectionFactory};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc`). The database pool and the
/// vector pool are optional: the service starts without them and reports
/// them as `not_initialized` on the health endpoint.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Gate limiting concurrently processed queries.
    pub limiter: Arc<AdmissionController>,
    /// The text-to-SQL pipeline; absent when the relational store is not
    /// configured.
    pub engine: Option<Arc<dyn QueryEngine>>,
    /// Relational store pool, used here only for health reporting.
    pub db: Option<masset_db::DbPool>,
    /// Vector-search connection pool, used here for health and stats.
    pub vector_pool: Option<Arc<ResourcePool<VectorConnectionFactory>>>,
    /// Whether the tracing subscriber was installed at startup.
    pub tracing_initialized: bool,
}
