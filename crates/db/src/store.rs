//! [`SqlStore`] implementation backed by PostgreSQL.
//!
//! Generated SQL is untrusted input in the sense that its shape is unknown,
//! so execution decodes rows dynamically (column by column) instead of via
//! typed `query_as` mappings.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::error::DatabaseError;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use masset_core::error::CoreError;
use masset_core::services::SqlStore;

use crate::DbPool;

/// Syntax checking and execution against the configured PostgreSQL database.
pub struct PgSqlStore {
    pool: DbPool,
}

impl PgSqlStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SqlStore for PgSqlStore {
    /// Run the statement through the planner without executing it.
    ///
    /// `EXPLAIN` makes the server parse and plan the query, so syntax errors,
    /// unknown tables, and unknown columns are all reported here, including
    /// the server's "Perhaps you meant ..." hints that later generation
    /// attempts feed back into the prompt.
    async fn check_syntax(&self, sql: &str) -> Result<(), CoreError> {
        let explain = format!("EXPLAIN {sql}");
        match sqlx::query(&explain).fetch_all(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) => Err(CoreError::Syntax(describe_error(&e))),
        }
    }

    async fn execute(&self, sql: &str) -> Result<String, CoreError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Execution(describe_error(&e)))?;

        tracing::info!(rows = rows.len(), "Query executed");

        let serialized: Vec<Value> = rows.iter().map(row_to_json).collect();
        serde_json::to_string(&serialized)
            .map_err(|e| CoreError::Execution(format!("failed to serialize result rows: {e}")))
    }
}

/// Render a sqlx error with the server's message and hint when present.
///
/// The hint matters: "Perhaps you meant to reference the column ..." is fed
/// back into the next generation prompt.
fn describe_error(err: &sqlx::Error) -> String {
    if let Some(db_err) = err.as_database_error() {
        if let Some(pg) = db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            return match pg.hint() {
                Some(hint) => format!("{} (hint: {hint})", pg.message()),
                None => pg.message().to_string(),
            };
        }
        return db_err.message().to_string();
    }
    err.to_string()
}

/// Convert one row into a `{column: value}` JSON object.
fn row_to_json(row: &PgRow) -> Value {
    let mut object = serde_json::Map::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), column_value(row, idx));
    }
    Value::Object(object)
}

/// Decode a single column into JSON, trying the common scalar types the
/// market-data schema uses. Unknown types degrade to a type-name marker
/// rather than failing the whole result set.
fn column_value(row: &PgRow, idx: usize) -> Value {
    if let Ok(raw) = row.try_get_raw(idx) {
        if raw.is_null() {
            return Value::Null;
        }
    }

    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f32, _>(idx) {
        return Value::from(v as f64);
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<sqlx::types::BigDecimal, _>(idx) {
        // NUMERIC: keep a JSON number when it round-trips, else the exact text.
        let text = v.to_string();
        return match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::from(n),
            _ => Value::String(text),
        };
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(idx) {
        return Value::String(v.to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(idx) {
        return Value::String(v.to_string());
    }
    if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
        return Value::String(v.to_rfc3339());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return Value::String(v.to_string());
    }
    if let Ok(v) = row.try_get::<uuid::Uuid, _>(idx) {
        return Value::String(v.to_string());
    }

    Value::String(format!("<{}>", row.columns()[idx].type_info().name()))
}
