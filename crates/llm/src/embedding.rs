//! Embedding client for an Ollama-style serving endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use masset_core::config::EmbeddingConfig;
use masset_core::error::CoreError;
use masset_core::services::TextEmbedder;

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for the embedding service used by hybrid search.
pub struct HttpEmbedder {
    http: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(EMBEDDING_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { http, config }
    }
}

#[async_trait]
impl TextEmbedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let url = format!("{}/api/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model: &self.config.model,
            prompt: text,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Retrieval(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Retrieval(format!(
                "embedding service returned {status}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Retrieval(format!("invalid embedding response: {e}")))?;

        if parsed.embedding.is_empty() {
            return Err(CoreError::Retrieval("embedding service returned an empty vector".into()));
        }

        Ok(parsed.embedding)
    }
}
