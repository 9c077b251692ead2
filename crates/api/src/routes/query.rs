use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use masset_core::error::CoreError;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    /// The natural-language question.
    #[validate(length(min = 1, max = 2000, message = "query must be 1..=2000 characters"))]
    pub query: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    /// The question as received.
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
    /// Natural-language answer (results-based on success, explanatory on
    /// failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Seconds spent in the admission queue before processing started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<f64>,
}

/// POST /query -- run one question through admission control and the
/// text-to-SQL pipeline.
async fn process_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> AppResult<(StatusCode, Json<QueryResponse>)> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let engine = state
        .engine
        .as_ref()
        .ok_or(AppError::NotInitialized("query engine"))?;

    tracing::info!(query = %request.query, "Received query");
    if state.limiter.is_at_capacity() {
        tracing::warn!(status = ?state.limiter.status(), "Server at capacity, request will queue");
    }

    let request_id = format!(
        "{}_{}",
        request.session_id.as_deref().unwrap_or("anonymous"),
        request.user_id.as_deref().unwrap_or("user"),
    );

    let permit = match state.limiter.acquire(request_id).await {
        Ok(permit) => permit,
        Err(CoreError::QueueTimeout(_)) => {
            // Structured server-busy response; the request never entered
            // the pipeline.
            return Ok((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(QueryResponse {
                    success: false,
                    query: request.query,
                    generated_sql: None,
                    result: None,
                    error_message: Some(
                        "Request timed out. Server is too busy. Please try again later.".into(),
                    ),
                    session_id: request.session_id,
                    user_id: request.user_id,
                    wait_time: None,
                }),
            ));
        }
        Err(other) => return Err(other.into()),
    };

    let wait_time = permit.wait_time().as_secs_f64();
    tracing::info!(wait_secs = wait_time, "Processing request");

    let outcome = engine.run(&request.query).await;
    drop(permit);

    Ok((
        StatusCode::OK,
        Json(QueryResponse {
            success: outcome.success,
            query: request.query,
            generated_sql: outcome.generated_sql,
            // The answer is user-visible in both outcomes; on failure it
            // explains the error in natural language.
            result: Some(outcome.answer),
            error_message: outcome.error_message,
            session_id: request.session_id,
            user_id: request.user_id,
            wait_time: Some(wait_time),
        }),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/query", post(process_query))
}
