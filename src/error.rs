//! Error taxonomy shared by the embedding, ranking, and backfill paths.

use std::time::Duration;

use thiserror::Error;

use crate::item::ItemKind;

/// Failure raised by an embedding provider call.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Input was empty after trimming; nothing to embed.
    #[error("embedding input text must not be empty")]
    EmptyInput,
    /// The call exceeded its deadline.
    #[error("embedding request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// Connection, DNS, or body transfer failure.
    #[error("embedding request failed: {0}")]
    Network(String),
    /// Provider answered 429.
    #[error("embedding provider rate limited the request: {0}")]
    RateLimited(String),
    /// Provider answered with a 5xx status.
    #[error("embedding provider returned {status}: {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// Provider rejected the credential (401/403).
    #[error("embedding provider rejected credentials ({status})")]
    Auth {
        /// HTTP status code.
        status: u16,
    },
    /// Provider rejected the request for another client-side reason.
    #[error("embedding provider rejected the request ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// Response body could not be interpreted.
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),
    /// Provider returned a vector of the wrong length.
    #[error("provider returned {actual} dimensions, expected {expected}")]
    Dimensions {
        /// Configured dimensionality.
        expected: usize,
        /// Length actually returned.
        actual: usize,
    },
    /// Provider could not be constructed from its configuration.
    #[error("invalid embedding provider configuration: {0}")]
    Config(String),
}

impl EmbeddingError {
    /// Rate limits and transient network/server failures may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }

    /// Maps a transport error from `reqwest` onto the taxonomy.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Stored vector disagrees with the configured provider dimensionality.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stored embedding has {actual} dimensions, provider expects {expected}")]
pub struct DimensionMismatch {
    /// Configured dimensionality.
    pub expected: usize,
    /// Dimensionality found on the item.
    pub actual: usize,
}

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database driver reported an error.
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    /// Backend is not reachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The query did not finish within its deadline.
    #[error("store query timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// A row could not be decoded into the expected shape.
    #[error("invalid row: {0}")]
    InvalidRow(String),
    /// Referenced item does not exist (or was deleted).
    #[error("{kind} {id} not found")]
    NotFound {
        /// Item table.
        kind: ItemKind,
        /// Item identifier.
        id: String,
    },
}

/// Failure surfaced by the search orchestrator.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The request itself was unusable.
    #[error("invalid search request: {0}")]
    InvalidQuery(String),
    /// The full-text primitive failed; there is no fallback below lexical.
    #[error("lexical query failed: {0}")]
    Lexical(#[source] StoreError),
}

/// Failure generating or persisting an item embedding.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Provider call failed after retries.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Vector was produced but could not be written.
    #[error("failed to store embedding: {0}")]
    Store(#[from] StoreError),
}

impl GenerateError {
    /// Whether the underlying failure was a retryable provider error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding(err) if err.is_retryable())
    }
}

/// Per-item backfill failure; logged and counted, never fatal to the run.
#[derive(Debug, Error)]
#[error("backfill of {kind} {id} failed: {source}")]
pub struct BackfillItemError {
    /// Item table.
    pub kind: ItemKind,
    /// Item identifier.
    pub id: String,
    /// Cause.
    #[source]
    pub source: GenerateError,
}

/// Failure that aborts a backfill run.
#[derive(Debug, Error)]
pub enum BackfillError {
    /// Candidate selection or counting failed.
    #[error("backfill selection failed: {0}")]
    Store(#[from] StoreError),
    /// The worker task panicked or was aborted.
    #[error("backfill task did not complete: {0}")]
    Join(String),
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid configuration for {key}: {reason}")]
pub struct ConfigError {
    /// Offending option.
    pub key: &'static str,
    /// Human-readable reason.
    pub reason: String,
}

impl ConfigError {
    pub(crate) fn new(key: &'static str, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
        }
    }
}
