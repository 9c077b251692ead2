use std::time::Duration;

/// Error taxonomy shared across the service.
///
/// Only [`CoreError::QueueTimeout`] and unrecoverable infrastructure errors
/// are allowed to surface to the HTTP layer; every other variant is handled
/// inside the pipeline (retried, or turned into explanatory answer content).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The request waited longer than the admission queue timeout and never
    /// entered the pipeline.
    #[error("Timed out after {}s waiting for an admission slot", .0.as_secs())]
    QueueTimeout(Duration),

    /// No pooled connection became available within the checkout timeout.
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// The relational store rejected the statement at syntax-check time.
    #[error("SQL syntax check failed: {0}")]
    Syntax(String),

    /// The relational store failed while executing the statement.
    #[error("SQL execution failed: {0}")]
    Execution(String),

    /// The text-completion service failed or returned unusable output.
    #[error("Text completion failed: {0}")]
    Generation(String),

    /// The vector-search service failed during context retrieval.
    #[error("Context retrieval failed: {0}")]
    Retrieval(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything that should never happen in normal operation.
    #[error("Internal error: {0}")]
    Internal(String),
}
