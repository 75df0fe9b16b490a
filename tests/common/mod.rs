#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hybrid_search::embedder::{EmbedPurpose, EmbeddingClient, EmbeddingProvider, RetryPolicy};
use hybrid_search::item::{ItemContent, PostType, SearchableItem};
use hybrid_search::store::{ItemMetadata, MemoryStore};
use hybrid_search::{EmbeddingError, EmbeddingGenerator};

const CONCURRENCY: &[&str] = &[
    "race", "concurrent", "parallel", "async", "deadlock", "mutex", "lock", "thread", "tasks",
];
const DATA_ACCESS: &[&str] = &[
    "data", "access", "postgresql", "queries", "query", "database", "row", "sql", "write",
];
const PRESENTATION: &[&str] = &["css", "flexbox", "layout", "safari", "overflow", "container"];

/// Embeds text onto three concept axes so related vocabulary lands close together.
pub struct ConceptProvider {
    pub dims: usize,
    pub calls: AtomicUsize,
}

impl ConceptProvider {
    pub fn new() -> Self {
        Self::with_dims(4)
    }

    pub fn with_dims(dims: usize) -> Self {
        assert!(dims >= 4);
        Self {
            dims,
            calls: AtomicUsize::new(0),
        }
    }
}

fn axis_weight(words: &[String], vocabulary: &[&str]) -> f32 {
    words
        .iter()
        .filter(|word| vocabulary.iter().any(|term| word.starts_with(term)))
        .count() as f32
}

#[async_trait]
impl EmbeddingProvider for ConceptProvider {
    fn name(&self) -> &str {
        "concept"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn max_input_chars(&self) -> usize {
        4_000
    }

    async fn embed(&self, text: &str, _purpose: EmbedPurpose) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect();
        let mut vector = vec![0.0; self.dims];
        vector[0] = axis_weight(&words, CONCURRENCY);
        vector[1] = axis_weight(&words, DATA_ACCESS);
        vector[2] = axis_weight(&words, PRESENTATION);
        vector[3] = 0.1;
        Ok(vector)
    }
}

/// Provider that always fails with a non-retryable error.
pub struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        4
    }

    fn max_input_chars(&self) -> usize {
        4_000
    }

    async fn embed(&self, _text: &str, _purpose: EmbedPurpose) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Auth { status: 401 })
    }
}

pub fn generator_for(provider: Arc<dyn EmbeddingProvider>) -> EmbeddingGenerator {
    EmbeddingGenerator::new(EmbeddingClient::new(
        provider,
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
        },
        Duration::from_secs(5),
    ))
}

pub fn concept_generator() -> EmbeddingGenerator {
    generator_for(Arc::new(ConceptProvider::new()))
}

pub fn failing_generator() -> EmbeddingGenerator {
    generator_for(Arc::new(FailingProvider))
}

pub fn post(id: &str, title: &str, description: &str, created: i64) -> SearchableItem {
    SearchableItem::new(
        id,
        ItemContent::Post {
            post_type: PostType::Question,
            title: title.into(),
            description: description.into(),
        },
        created,
    )
}

pub const RACE_ID: &str = "post-race";

/// A small forum: one post about a concurrency bug that shares no words with
/// "concurrent data access issues", plus posts that do match it lexically.
pub fn forum_posts() -> Vec<SearchableItem> {
    vec![
        post(
            RACE_ID,
            "Race condition in async PostgreSQL queries",
            "Two tasks update the same row and one write is lost.",
            1_000,
        ),
        post(
            "post-layout",
            "Flexbox layout issues in Safari",
            "Items overflow the container.",
            2_000,
        ),
        post(
            "post-export",
            "Data export times out",
            "Exporting a large CSV file never finishes.",
            3_000,
        ),
    ]
}

pub async fn store_with(items: Vec<SearchableItem>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for item in items {
        store.insert(item, ItemMetadata::default()).await;
    }
    store
}
