//! Embedding provider client: provider trait, input truncation, timeouts, and retry.
//!
//! Providers only know how to perform one HTTP round trip. [`EmbeddingClient`]
//! wraps the active provider with the call discipline every caller shares:
//! reject empty input, keep at most `max_input_chars` characters of prefix,
//! bound each attempt by a deadline, retry retryable failures with exponential
//! backoff, and verify the returned dimensionality.

pub mod ollama;
pub mod voyage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingProviderConfig, ProviderKind};
use crate::error::EmbeddingError;
use crate::telemetry;

pub use ollama::OllamaProvider;
pub use voyage::VoyageProvider;

const ERROR_BODY_LIMIT: usize = 512;

/// Whether text is being stored or used to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedPurpose {
    /// Content being indexed.
    Document,
    /// A search query.
    Query,
}

impl EmbedPurpose {
    /// Label sent to asymmetric providers.
    pub fn as_str(self) -> &'static str {
        match self {
            EmbedPurpose::Document => "document",
            EmbedPurpose::Query => "query",
        }
    }
}

/// A single embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Character budget per input.
    fn max_input_chars(&self) -> usize;

    /// Performs one embedding call. Inputs arrive already truncated.
    async fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>, EmbeddingError>;
}

/// Builds the provider selected by `config`.
pub fn build_provider(
    config: &EmbeddingProviderConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    config
        .validate()
        .map_err(|err| EmbeddingError::Config(err.to_string()))?;
    let provider: Arc<dyn EmbeddingProvider> = match config.kind {
        ProviderKind::Voyage => Arc::new(VoyageProvider::new(config)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config)?),
    };
    Ok(provider)
}

/// Keeps at most `max_chars` characters of prefix.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Attempts and backoff for retryable provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles afterwards.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

/// Call discipline around the active provider.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl EmbeddingClient {
    /// Wraps `provider`; each attempt is bounded by `call_timeout`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            provider,
            retry,
            call_timeout,
        }
    }

    /// Builds the configured provider with the default retry policy.
    pub fn from_config(config: &EmbeddingProviderConfig) -> Result<Self, EmbeddingError> {
        Ok(Self::new(
            build_provider(config)?,
            RetryPolicy::default(),
            config.timeout,
        ))
    }

    /// Vector length produced by the active provider.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Name of the active provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embeds `text`, retrying transient failures.
    pub async fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>, EmbeddingError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let input = truncate_chars(trimmed, self.provider.max_input_chars());
        let expected = self.provider.dimensions();

        let mut attempt = 1usize;
        loop {
            let started = Instant::now();
            let result =
                match tokio::time::timeout(self.call_timeout, self.provider.embed(input, purpose))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(EmbeddingError::Timeout(started.elapsed())),
                };
            match result {
                Ok(vector) if vector.len() == expected => return Ok(vector),
                Ok(vector) => {
                    return Err(EmbeddingError::Dimensions {
                        expected,
                        actual: vector.len(),
                    })
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    telemetry::embedding_retry(self.provider.name(), attempt, delay, &err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

pub(crate) fn http_client(
    timeout: Duration,
    mut headers: HeaderMap,
) -> Result<Client, EmbeddingError> {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|err| EmbeddingError::Config(format!("failed to build HTTP client: {err}")))
}

pub(crate) fn embeddings_endpoint(base_url: &str) -> String {
    format!("{}/embeddings", base_url.trim_end_matches('/'))
}

/// Posts an OpenAI-style embeddings request and returns the first vector.
pub(crate) async fn post_embeddings<T: Serialize + ?Sized>(
    client: &Client,
    endpoint: &str,
    body: &T,
    timeout: Duration,
) -> Result<Vec<f32>, EmbeddingError> {
    let resp = client
        .post(endpoint)
        .json(body)
        .send()
        .await
        .map_err(|err| EmbeddingError::from_transport(err, timeout))?;
    let status = resp.status();
    if status.is_success() {
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| EmbeddingError::from_transport(err, timeout))?;
        let mut parsed: EmbeddingResponse = serde_json::from_slice(&bytes)
            .map_err(|err| EmbeddingError::MalformedResponse(err.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);
        return parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or_else(|| EmbeddingError::MalformedResponse("response carried no embedding".into()));
    }

    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(classify_status(status, body))
}

fn classify_status(status: StatusCode, body: String) -> EmbeddingError {
    let body = truncate_chars(&body, ERROR_BODY_LIMIT).to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => EmbeddingError::RateLimited(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmbeddingError::Auth {
            status: status.as_u16(),
        },
        s if s.is_server_error() => EmbeddingError::Server {
            status: s.as_u16(),
            body,
        },
        s => EmbeddingError::Rejected {
            status: s.as_u16(),
            body,
        },
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
