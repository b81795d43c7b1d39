//! OpenAI-compatible embedding client.

use async_trait::async_trait;
use ragwatch_core::{Embedder, EmbeddingOutput, ProviderError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Async embeddings client for `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_retries: usize,
    backoff_base: Duration,
}

impl OpenAiEmbedder {
    /// Build a client. `api_key` may be omitted for local servers.
    pub fn new(
        api_key: Option<&str>,
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, ProviderError> {
        if model.trim().is_empty() {
            return Err(ProviderError::Backend("missing embedding model name".to_string()));
        }
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let auth = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ProviderError::Backend(format!("invalid API key: {e}")))?;
            headers.insert(AUTHORIZATION, auth);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Backend(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            max_retries,
            backoff_base: Duration::from_millis(500),
        })
    }

    /// Override the first retry delay.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.backoff_base * (1 << capped)
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
            };
            let error = match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let mut parsed: EmbeddingResponse = resp
                        .json()
                        .await
                        .map_err(|e| ProviderError::Malformed(e.to_string()))?;
                    parsed.data.sort_by_key(|entry| entry.index);
                    return Ok(parsed.data.into_iter().map(|e| e.embedding).collect());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if Self::should_retry(status) && attempt < self.max_retries {
                        warn!("Embedding request returned {}, retrying", status);
                        attempt += 1;
                        tokio::time::sleep(self.retry_backoff(attempt)).await;
                        continue;
                    }
                    if status == StatusCode::SERVICE_UNAVAILABLE {
                        ProviderError::Unavailable(format!("{status}: {body}"))
                    } else {
                        ProviderError::Backend(format!("{status}: {body}"))
                    }
                }
                Err(err) if err.is_connect() || err.is_timeout() => {
                    if attempt < self.max_retries {
                        warn!("Embedding endpoint unreachable ({}), retrying", err);
                        attempt += 1;
                        tokio::time::sleep(self.retry_backoff(attempt)).await;
                        continue;
                    }
                    ProviderError::Unavailable(err.to_string())
                }
                Err(err) => ProviderError::Backend(err.to_string()),
            };
            return Err(error);
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(texts).await?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(ProviderError::Malformed(format!(
                "expected {}-dimensional embeddings, got {}",
                self.dimension,
                bad.len()
            )));
        }
        debug!("Embedded {} texts via {}", vectors.len(), self.endpoint);
        Ok(texts
            .iter()
            .zip(vectors)
            .map(|(text, embedding)| EmbeddingOutput {
                embedding,
                token_count: text.split_whitespace().count(),
            })
            .collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
