//! Collaborator interfaces consumed by the pipeline.
//!
//! The original system reached these services through duck-typed callables;
//! here each one is a narrow async trait injected at construction time so
//! tests can substitute doubles without touching the network.

use async_trait::async_trait;

use crate::error::CoreError;

/// An opaque text-completion service (may be slow, may fail).
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Send a prompt and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, CoreError>;
}

/// Converts text into an embedding vector for hybrid search.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;
}

/// Retrieves schema snippets and exemplar SQL relevant to a question.
///
/// Failures surface as [`CoreError::Retrieval`]; deciding whether to fall
/// back to the default schema is the pipeline's job, not the retriever's.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Schema/DDL snippets matching the question.
    async fn schema_examples(&self, question: &str, limit: usize)
        -> Result<Vec<String>, CoreError>;

    /// Exemplar SQL statements matching the question. Used only on retry.
    async fn sample_queries(&self, question: &str, limit: usize)
        -> Result<Vec<String>, CoreError>;
}

/// The relational store: syntax checking and execution of generated SQL.
///
/// Both calls are potentially slow and must be awaited off any
/// latency-sensitive path.
#[async_trait]
pub trait SqlStore: Send + Sync {
    /// Ask the store's own query checker whether the statement parses.
    async fn check_syntax(&self, sql: &str) -> Result<(), CoreError>;

    /// Run the statement and return the serialized result set.
    async fn execute(&self, sql: &str) -> Result<String, CoreError>;
}

// Arc forwarding so the composition root can wire trait objects into
// components that take the traits by value.

#[async_trait]
impl<T: TextCompletion + ?Sized> TextCompletion for std::sync::Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
        (**self).complete(prompt).await
    }
}

#[async_trait]
impl<T: TextEmbedder + ?Sized> TextEmbedder for std::sync::Arc<T> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        (**self).embed(text).await
    }
}

#[async_trait]
impl<T: ContextRetriever + ?Sized> ContextRetriever for std::sync::Arc<T> {
    async fn schema_examples(&self, question: &str, limit: usize)
        -> Result<Vec<String>, CoreError> {
        (**self).schema_examples(question, limit).await
    }

    async fn sample_queries(&self, question: &str, limit: usize)
        -> Result<Vec<String>, CoreError> {
        (**self).sample_queries(question, limit).await
    }
}

#[async_trait]
impl<T: SqlStore + ?Sized> SqlStore for std::sync::Arc<T> {
    async fn check_syntax(&self, sql: &str) -> Result<(), CoreError> {
        (**self).check_syntax(sql).await
    }

    async fn execute(&self, sql: &str) -> Result<String, CoreError> {
        (**self).execute(sql).await
    }
}
