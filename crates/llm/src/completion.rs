//! Text-completion client for an OpenAI-compatible serving endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use masset_core::config::CompletionConfig;
use masset_core::error::CoreError;
use masset_core::services::TextCompletion;

/// Upper bound on tokens requested per completion; generated SQL and answers
/// comfortably fit well below this.
const MAX_COMPLETION_TOKENS: u32 = 2048;

/// HTTP timeout for a single completion call. Completions are slow but a
/// hung upstream must not pin an admission slot forever.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Client for the text-completion service.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    config: CompletionConfig,
}

impl HttpCompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(COMPLETION_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { http, config }
    }
}

#[async_trait]
impl TextCompletion for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
        let url = format!("{}/completions", self.config.server_url.trim_end_matches('/'));
        let body = CompletionRequest {
            model: &self.config.model_name,
            prompt,
            temperature: self.config.temperature,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Generation(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Generation(format!(
                "completion service returned {status}: {detail}"
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Generation(format!("invalid completion response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| CoreError::Generation("completion response had no choices".into()))?;

        tracing::debug!(model = %self.config.model_name, chars = text.len(), "Completion received");
        Ok(text)
    }
}
