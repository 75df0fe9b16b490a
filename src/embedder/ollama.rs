//! Local OpenAI-compatible embeddings client (Ollama, symmetric).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Serialize;

use super::{embeddings_endpoint, http_client, post_embeddings, EmbedPurpose, EmbeddingProvider};
use crate::config::EmbeddingProviderConfig;
use crate::error::EmbeddingError;

/// Symmetric provider: the purpose is ignored.
#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_input_chars: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    input: &'a str,
    model: &'a str,
}

impl OllamaProvider {
    /// Builds a client for the server at `config.base_url`.
    pub fn new(config: &EmbeddingProviderConfig) -> Result<Self, EmbeddingError> {
        let mut headers = HeaderMap::new();
        // Proxies in front of local servers sometimes want a token.
        if let Some(key) = config.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .map_err(|_| EmbeddingError::Config("invalid API key".into()))?;
            headers.insert(AUTHORIZATION, bearer);
        }
        Ok(Self {
            client: http_client(config.timeout, headers)?,
            endpoint: embeddings_endpoint(&config.base_url),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_input_chars: config.max_input_chars,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn embed(&self, text: &str, _purpose: EmbedPurpose) -> Result<Vec<f32>, EmbeddingError> {
        let body = OllamaRequest {
            input: text,
            model: &self.model,
        };
        post_embeddings(&self.client, &self.endpoint, &body, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::test_support::{mock_server, vector_reply};
    use crate::embedder::{EmbeddingClient, RetryPolicy};
    use axum::http::StatusCode;
    use std::sync::Arc;

    fn config(base_url: String) -> EmbeddingProviderConfig {
        EmbeddingProviderConfig {
            dimensions: 2,
            max_input_chars: 10,
            ..EmbeddingProviderConfig::ollama(Some(base_url))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_and_document_requests_are_identical() {
        let (base_url, recorded) = mock_server(vec![vector_reply(&[0.6, 0.8])]).await;
        let provider = OllamaProvider::new(&config(base_url)).expect("provider");
        provider
            .embed("same text", EmbedPurpose::Query)
            .await
            .expect("query");
        provider
            .embed("same text", EmbedPurpose::Document)
            .await
            .expect("document");

        let bodies = recorded.bodies.lock().expect("lock").clone();
        assert_eq!(bodies[0], bodies[1]);
        assert!(bodies[0].get("input_type").is_none());
        assert_eq!(bodies[0]["model"], "nomic-embed-text");
        let auth = recorded.auth.lock().expect("lock").clone();
        assert_eq!(auth[0], None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_retries_server_errors_and_truncates() {
        let (base_url, recorded) = mock_server(vec![
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": "loading model" }),
            ),
            vector_reply(&[1.0, 0.0]),
        ])
        .await;
        let config = config(base_url);
        let provider = Arc::new(OllamaProvider::new(&config).expect("provider"));
        let client = EmbeddingClient::new(
            provider,
            RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(5),
            },
            config.timeout,
        );

        let vector = client
            .embed("a rather long document body", EmbedPurpose::Document)
            .await
            .expect("second attempt succeeds");
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(recorded.calls(), 2);
        let bodies = recorded.bodies.lock().expect("lock").clone();
        assert_eq!(bodies[1]["input"], "a rather l");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_server_is_a_network_error() {
        let provider =
            OllamaProvider::new(&config("http://127.0.0.1:9".into())).expect("provider");
        let err = provider
            .embed("text", EmbedPurpose::Document)
            .await
            .expect_err("nothing listens on port 9");
        assert!(err.is_retryable());
    }
}
