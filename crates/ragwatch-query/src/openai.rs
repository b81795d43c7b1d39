//! OpenAI-compatible chat completion generator.

use async_trait::async_trait;
use ragwatch_core::{Generator, ProviderError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::prompt::build_prompt;

const SYSTEM_PROMPT: &str =
    "You answer questions using only the documents supplied by the user. \
     If the documents do not contain the answer, say so.";

/// Async client for `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: usize,
    backoff_base: Duration,
}

impl OpenAiGenerator {
    /// Build a client. `api_key` may be omitted for local servers.
    pub fn new(
        api_key: Option<&str>,
        base_url: &str,
        model: &str,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, ProviderError> {
        if model.trim().is_empty() {
            return Err(ProviderError::Backend("missing generation model name".to_string()));
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
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            temperature: 0.0,
            max_tokens: Some(512),
            max_retries,
            backoff_base: Duration::from_millis(500),
        })
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// `None` leaves the limit to the server.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the first retry delay.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        self.backoff_base * (1 << attempt.min(5) as u32)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut attempt = 0usize;
        loop {
            let error = match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: ChatResponse = resp
                        .json()
                        .await
                        .map_err(|e| ProviderError::Malformed(e.to_string()))?;
                    return parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or_else(|| {
                            ProviderError::Malformed("response has no message content".to_string())
                        });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && attempt < self.max_retries {
                        warn!("Chat request returned {}, retrying", status);
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
                        warn!("Chat endpoint unreachable ({}), retrying", err);
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
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, query: &str, context: &[&str]) -> Result<String, ProviderError> {
        let prompt = build_prompt(query, context);
        let answer = self.complete(&prompt).await?;
        debug!("Generated {} chars with {}", answer.len(), self.model);
        Ok(answer)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}
