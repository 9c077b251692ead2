//! Context retrieval for SQL generation.
//!
//! Embeds the question, checks a pooled connection out, and runs hybrid
//! search against the schema or sample-query collection. Every failure mode
//! surfaces as [`CoreError::Retrieval`] / [`CoreError::PoolExhausted`]; the
//! pipeline decides whether to substitute the default schema.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use masset_core::config::VectorStoreConfig;
use masset_core::error::CoreError;
use masset_core::services::{ContextRetriever, TextEmbedder};

use crate::client::VectorConnectionFactory;
use crate::pool::ResourcePool;

/// Pool-backed implementation of [`ContextRetriever`].
pub struct Retriever {
    pool: Arc<ResourcePool<VectorConnectionFactory>>,
    embedder: Arc<dyn TextEmbedder>,
    schema_collection: String,
    sample_collection: String,
    checkout_timeout: Duration,
}

impl Retriever {
    pub fn new(
        pool: Arc<ResourcePool<VectorConnectionFactory>>,
        embedder: Arc<dyn TextEmbedder>,
        config: &VectorStoreConfig,
    ) -> Self {
        Self {
            pool,
            embedder,
            schema_collection: config.schema_collection.clone(),
            sample_collection: config.sample_collection.clone(),
            checkout_timeout: config.checkout_timeout,
        }
    }

    async fn search(
        &self,
        collection: &str,
        question: &str,
        limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        let vector = self.embedder.embed(question).await?;
        let conn = self.pool.checkout(self.checkout_timeout).await?;
        let hits = conn.hybrid_search(collection, question, &vector, limit).await?;

        let snippets: Vec<String> = hits.into_iter().filter_map(|hit| hit.query).collect();
        tracing::info!(
            collection,
            found = snippets.len(),
            "Vector search completed",
        );
        Ok(snippets)
    }
}

#[async_trait]
impl ContextRetriever for Retriever {
    async fn schema_examples(
        &self,
        question: &str,
        limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        self.search(&self.schema_collection, question, limit).await
    }

    async fn sample_queries(&self, question: &str, limit: usize) -> Result<Vec<String>, CoreError> {
        self.search(&self.sample_collection, question, limit).await
    }
}

/// Stand-in used when the vector store is disabled by configuration.
///
/// Every call reports a retrieval failure, which the pipeline answers with
/// its default-schema fallback.
pub struct DisabledRetriever;

#[async_trait]
impl ContextRetriever for DisabledRetriever {
    async fn schema_examples(
        &self,
        _question: &str,
        _limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        Err(CoreError::Retrieval("vector store is disabled".into()))
    }

    async fn sample_queries(
        &self,
        _question: &str,
        _limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        Err(CoreError::Retrieval("vector store is disabled".into()))
    }
}
