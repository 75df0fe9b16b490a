//! Voyage AI embeddings client (remote, asymmetric).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Serialize;

use super::{embeddings_endpoint, http_client, post_embeddings, EmbedPurpose, EmbeddingProvider};
use crate::config::EmbeddingProviderConfig;
use crate::error::EmbeddingError;

/// Remote provider that embeds documents and queries differently.
#[derive(Clone)]
pub struct VoyageProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_input_chars: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct VoyageRequest<'a> {
    input: &'a str,
    model: &'a str,
    input_type: &'a str,
}

impl VoyageProvider {
    /// Builds a client from `config`; the API key is required.
    pub fn new(config: &EmbeddingProviderConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| EmbeddingError::Config("missing Voyage API key".into()))?;
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| EmbeddingError::Config("invalid Voyage API key".into()))?;
        headers.insert(AUTHORIZATION, bearer);
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
impl EmbeddingProvider for VoyageProvider {
    fn name(&self) -> &str {
        "voyage"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>, EmbeddingError> {
        let body = VoyageRequest {
            input: text,
            model: &self.model,
            input_type: purpose.as_str(),
        };
        post_embeddings(&self.client, &self.endpoint, &body, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::test_support::{mock_server, vector_reply};
    use axum::http::StatusCode;

    fn config(base_url: String) -> EmbeddingProviderConfig {
        EmbeddingProviderConfig {
            base_url,
            dimensions: 3,
            ..EmbeddingProviderConfig::voyage("vk-test")
        }
    }

    #[test]
    fn requires_api_key() {
        let mut config = config("http://127.0.0.1:1".into());
        config.api_key = Some("   ".into());
        assert!(matches!(
            VoyageProvider::new(&config),
            Err(EmbeddingError::Config(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sends_input_type_and_bearer_token() {
        let (base_url, recorded) = mock_server(vec![vector_reply(&[0.1, 0.2, 0.3])]).await;
        let provider = VoyageProvider::new(&config(base_url)).expect("provider");

        let vector = provider
            .embed("lock contention", EmbedPurpose::Query)
            .await
            .expect("embedding");
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        provider
            .embed("stored text", EmbedPurpose::Document)
            .await
            .expect("embedding");

        let bodies = recorded.bodies.lock().expect("lock").clone();
        assert_eq!(bodies[0]["input_type"], "query");
        assert_eq!(bodies[0]["input"], "lock contention");
        assert_eq!(bodies[0]["model"], "voyage-code-3");
        assert_eq!(bodies[1]["input_type"], "document");
        let auth = recorded.auth.lock().expect("lock").clone();
        assert_eq!(auth[0].as_deref(), Some("Bearer vk-test"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn maps_status_codes() {
        let (base_url, _) = mock_server(vec![(
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({ "detail": "slow down" }),
        )])
        .await;
        let provider = VoyageProvider::new(&config(base_url)).expect("provider");
        let err = provider
            .embed("text", EmbedPurpose::Document)
            .await
            .expect_err("rate limited");
        assert!(matches!(err, EmbeddingError::RateLimited(ref body) if body.contains("slow down")));

        let (base_url, _) = mock_server(vec![(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "detail": "bad key" }),
        )])
        .await;
        let provider = VoyageProvider::new(&config(base_url)).expect("provider");
        let err = provider
            .embed("text", EmbedPurpose::Document)
            .await
            .expect_err("unauthorized");
        assert!(matches!(err, EmbeddingError::Auth { status: 401 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_body_is_reported() {
        let (base_url, _) =
            mock_server(vec![(StatusCode::OK, serde_json::json!({ "unexpected": true }))]).await;
        let provider = VoyageProvider::new(&config(base_url)).expect("provider");
        let err = provider
            .embed("text", EmbedPurpose::Document)
            .await
            .expect_err("malformed");
        assert!(matches!(err, EmbeddingError::MalformedResponse(_)));
    }
}
