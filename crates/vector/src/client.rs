//! HTTP client for one connection to the vector-search service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use masset_core::error::CoreError;

use crate::pool::ConnectionFactory;

/// Keyword/vector balance for hybrid search.
const HYBRID_ALPHA: f32 = 0.5;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct HybridSearchRequest<'a> {
    query: &'a str,
    vector: &'a [f32],
    alpha: f32,
    limit: usize,
}

#[derive(Deserialize)]
struct HybridSearchResponse {
    hits: Vec<SearchHit>,
}

/// One record returned by hybrid search.
///
/// The `query` property carries the stored snippet (a DDL fragment in the
/// schema collection, an exemplar statement in the sample collection).
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub query: Option<String>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// A single connection to the vector-search service.
pub struct VectorSearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl VectorSearchClient {
    pub fn connect(base_url: &str) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Retrieval(format!("failed to build search client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Readiness probe used for pool liveness checks.
    pub async fn is_ready(&self) -> bool {
        let url = format!("{}/v1/.well-known/ready", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Combined keyword + embedding similarity search over one collection.
    pub async fn hybrid_search(
        &self,
        collection: &str,
        query: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, CoreError> {
        let url = format!("{}/v1/collections/{collection}/search", self.base_url);
        let body = HybridSearchRequest {
            query,
            vector,
            alpha: HYBRID_ALPHA,
            limit,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Retrieval(format!("hybrid search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Retrieval(format!(
                "vector-search service returned {status} for collection {collection}"
            )));
        }

        let parsed: HybridSearchResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Retrieval(format!("invalid hybrid search response: {e}")))?;

        Ok(parsed.hits)
    }
}

/// Factory handing [`VectorSearchClient`] connections to the pool.
pub struct VectorConnectionFactory {
    base_url: String,
}

impl VectorConnectionFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for VectorConnectionFactory {
    type Conn = VectorSearchClient;

    async fn connect(&self, id: u64) -> Result<VectorSearchClient, CoreError> {
        let client = VectorSearchClient::connect(&self.base_url)?;
        if !client.is_ready().await {
            return Err(CoreError::Retrieval(format!(
                "vector-search service at {} is not ready (connection {id})",
                self.base_url
            )));
        }
        Ok(client)
    }

    async fn is_alive(&self, conn: &VectorSearchClient) -> bool {
        conn.is_ready().await
    }
}
