#![warn(missing_docs)]
//! Hybrid relevance search over posts, answers, and approaches.
//!
//! A query runs a full-text ranking and, when an embedding provider is configured and
//! reachable, a vector-similarity ranking in parallel. The two are merged with reciprocal
//! rank fusion. Any failure on the semantic side degrades the request to full-text only.

pub mod api;
pub mod backfill;
pub mod config;
pub mod embedder;
pub mod error;
pub mod fusion;
pub mod generator;
pub mod item;
pub mod search;
pub mod store;
pub mod telemetry;

pub use backfill::{BackfillHandle, BackfillStats, BackfillWorker, StopSignal};
pub use config::{BackfillConfig, EmbeddingProviderConfig, FusionConfig, ProviderKind, SearchConfig};
pub use embedder::{EmbedPurpose, EmbeddingClient, EmbeddingProvider, RetryPolicy};
pub use error::{
    BackfillError, BackfillItemError, ConfigError, EmbeddingError, GenerateError, SearchError,
    StoreError,
};
pub use fusion::{fuse, FusedResult, RankSource, RankingEntry};
pub use generator::EmbeddingGenerator;
pub use item::{ItemContent, ItemKey, ItemKind, PostType, SearchableItem};
pub use search::{
    SearchMethod, SearchOptions, SearchOrchestrator, SearchResponse, SearchResult, SortMode,
};
pub use store::{EmbeddingStore, MemoryStore, PgStore, SearchFilters, SearchStore};
