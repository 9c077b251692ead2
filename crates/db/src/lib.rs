//! Relational store adapter.
//!
//! Owns the sqlx connection pool plus the [`masset_core::services::SqlStore`]
//! implementation that syntax-checks and executes generated SQL.

use sqlx::postgres::PgPoolOptions;

pub mod store;

pub use store::PgSqlStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}
