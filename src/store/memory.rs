//! In-process store with token-prefix lexical matching and exhaustive cosine ranking.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    query_terms, BackfillCursor, EmbeddingStore, ItemMetadata, LexicalQuery, SearchFilters,
    SearchHit, SearchStore, SemanticQuery,
};
use crate::error::StoreError;
use crate::item::{ItemContent, ItemKey, ItemKind, SearchableItem};

const TITLE_CHARS: usize = 100;
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone)]
struct StoredItem {
    item: SearchableItem,
    metadata: ItemMetadata,
}

/// Store that keeps every item in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<ItemKey, StoredItem>>,
    lexical_down: AtomicBool,
    semantic_down: AtomicBool,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item.
    pub async fn insert(&self, item: SearchableItem, metadata: ItemMetadata) {
        let mut items = self.items.write().await;
        items.insert(item.key(), StoredItem { item, metadata });
    }

    /// Current copy of an item.
    pub async fn get(&self, key: &ItemKey) -> Option<SearchableItem> {
        self.items.read().await.get(key).map(|stored| stored.item.clone())
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// True when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Makes lexical queries fail until reset.
    pub fn set_lexical_unavailable(&self, down: bool) {
        self.lexical_down.store(down, AtomicOrdering::SeqCst);
    }

    /// Makes semantic queries fail until reset.
    pub fn set_semantic_unavailable(&self, down: bool) {
        self.semantic_down.store(down, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl SearchStore for MemoryStore {
    async fn lexical_ranking(&self, query: LexicalQuery<'_>) -> Result<Vec<SearchHit>, StoreError> {
        if self.lexical_down.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("lexical index offline".into()));
        }
        let terms = lowercase_terms(query.text);
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let items = self.items.read().await;
        let mut hits: Vec<SearchHit> = lexical_matches(&items, query.kinds, query.filters, &terms)
            .map(|(stored, score)| to_hit(stored, score))
            .collect();
        hits.sort_by(compare_hits);
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn lexical_count(&self, query: LexicalQuery<'_>) -> Result<u64, StoreError> {
        if self.lexical_down.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("lexical index offline".into()));
        }
        let terms = lowercase_terms(query.text);
        let items = self.items.read().await;
        Ok(lexical_matches(&items, query.kinds, query.filters, &terms).count() as u64)
    }

    async fn semantic_ranking(&self, query: SemanticQuery<'_>) -> Result<Vec<SearchHit>, StoreError> {
        if self.semantic_down.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("vector index offline".into()));
        }
        if query.embedding.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }
        let dims = query.embedding.len();

        let items = self.items.read().await;
        let mut hits: Vec<SearchHit> = items
            .values()
            .filter(|stored| query.kinds.contains(&stored.item.kind()))
            .filter(|stored| matches_filters(query.filters, stored))
            .filter_map(|stored| {
                let stored_vector = stored.item.valid_embedding(dims)?;
                let similarity = cosine_similarity(query.embedding, stored_vector)?;
                Some(to_hit(stored, similarity))
            })
            .collect();
        hits.sort_by(compare_hits);
        hits.truncate(query.limit);
        Ok(hits)
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn count_missing(&self, kinds: &[ItemKind], dims: usize) -> Result<u64, StoreError> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .map(|stored| &stored.item)
            .filter(|item| awaiting_embedding(item, kinds, dims))
            .count() as u64)
    }

    async fn next_missing_batch(
        &self,
        kinds: &[ItemKind],
        dims: usize,
        cursor: Option<&BackfillCursor>,
        limit: usize,
    ) -> Result<Vec<SearchableItem>, StoreError> {
        let items = self.items.read().await;
        let mut batch: Vec<SearchableItem> = items
            .values()
            .map(|stored| &stored.item)
            .filter(|item| awaiting_embedding(item, kinds, dims))
            .filter(|item| cursor.map_or(true, |cursor| cursor.precedes(item)))
            .cloned()
            .collect();
        batch.sort_by(|a, b| {
            (a.created_epoch_ms, a.id.as_str(), a.kind().as_str()).cmp(&(
                b.created_epoch_ms,
                b.id.as_str(),
                b.kind().as_str(),
            ))
        });
        batch.truncate(limit);
        Ok(batch)
    }

    async fn store_embedding(&self, key: &ItemKey, embedding: &[f32]) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let stored = items.get_mut(key).ok_or_else(|| StoreError::NotFound {
            kind: key.kind,
            id: key.id.clone(),
        })?;
        stored.item.embedding = Some(embedding.to_vec());
        Ok(())
    }
}

fn lowercase_terms(text: &str) -> Vec<String> {
    query_terms(text)
        .into_iter()
        .map(|term| term.to_lowercase())
        .collect()
}

fn lexical_matches<'a>(
    items: &'a BTreeMap<ItemKey, StoredItem>,
    kinds: &'a [ItemKind],
    filters: &'a SearchFilters,
    terms: &'a [String],
) -> impl Iterator<Item = (&'a StoredItem, f64)> + 'a {
    items
        .values()
        .filter(move |stored| kinds.contains(&stored.item.kind()))
        .filter(move |stored| matches_filters(filters, stored))
        .filter_map(move |stored| {
            let score = lexical_score(terms, &lexical_text(&stored.item.content));
            (score > 0.0).then_some((stored, score))
        })
}

fn awaiting_embedding(item: &SearchableItem, kinds: &[ItemKind], dims: usize) -> bool {
    kinds.contains(&item.kind())
        && item.needs_embedding(dims)
        && !item.text_for_embedding().is_empty()
}

fn matches_filters(filters: &SearchFilters, stored: &StoredItem) -> bool {
    let meta = &stored.metadata;
    if let (Some(wanted), ItemContent::Post { post_type, .. }) =
        (filters.post_type, &stored.item.content)
    {
        if *post_type != wanted {
            return false;
        }
    }
    if !filters.tags.is_empty() && !filters.tags.iter().any(|tag| meta.tags.contains(tag)) {
        return false;
    }
    if let Some(status) = &filters.status {
        if meta.status != *status {
            return false;
        }
    }
    if let Some(author_id) = &filters.author_id {
        if meta.author.id != *author_id {
            return false;
        }
    }
    if let Some(author_type) = filters.author_type {
        if meta.author.author_type != author_type {
            return false;
        }
    }
    let (lower, upper) = filters.created_bounds_ms();
    if lower.is_some_and(|lower| stored.item.created_epoch_ms < lower) {
        return false;
    }
    if upper.is_some_and(|upper| stored.item.created_epoch_ms >= upper) {
        return false;
    }
    true
}

fn lexical_text(content: &ItemContent) -> String {
    match content {
        ItemContent::Post {
            title, description, ..
        } => format!("{title} {description}"),
        ItemContent::Answer { content } => content.clone(),
        ItemContent::Approach {
            angle,
            method,
            outcome,
            solution,
        } => format!("{angle} {method} {outcome} {solution}"),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// Terms match token prefixes; more distinct matching terms rank higher, then term frequency.
fn lexical_score(terms: &[String], text: &str) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }
    let mut matched_terms = 0usize;
    let mut occurrences = 0usize;
    for term in terms {
        let hits = tokens.iter().filter(|token| token.starts_with(term.as_str())).count();
        if hits > 0 {
            matched_terms += 1;
            occurrences += hits;
        }
    }
    if matched_terms == 0 {
        return 0.0;
    }
    matched_terms as f64 + occurrences as f64 / (tokens.len() as f64 + 1.0)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.raw_score
        .total_cmp(&a.raw_score)
        .then_with(|| b.created_epoch_ms.cmp(&a.created_epoch_ms))
        .then_with(|| a.key.cmp(&b.key))
}

fn to_hit(stored: &StoredItem, raw_score: f64) -> SearchHit {
    let item = &stored.item;
    let (item_type, title, body) = match &item.content {
        ItemContent::Post {
            post_type,
            title,
            description,
        } => (post_type.as_str().to_string(), title.clone(), description.clone()),
        ItemContent::Answer { content } => (
            ItemKind::Answer.as_str().to_string(),
            prefix(content, TITLE_CHARS),
            content.clone(),
        ),
        ItemContent::Approach { angle, method, .. } => (
            ItemKind::Approach.as_str().to_string(),
            prefix(&format!("{angle} {method}"), TITLE_CHARS),
            lexical_text(&item.content),
        ),
    };
    SearchHit {
        key: item.key(),
        item_type,
        title,
        snippet: prefix(body.trim(), SNIPPET_CHARS),
        metadata: stored.metadata.clone(),
        created_epoch_ms: item.created_epoch_ms,
        updated_epoch_ms: item.updated_epoch_ms,
        raw_score,
    }
}

fn prefix(text: &str, max_chars: usize) -> String {
    crate::embedder::truncate_chars(text, max_chars).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::PostType;
    use crate::store::{Author, AuthorType};
    use chrono::NaiveDate;

    fn post(id: &str, title: &str, created: i64) -> SearchableItem {
        SearchableItem::new(
            id,
            ItemContent::Post {
                post_type: PostType::Question,
                title: title.into(),
                description: String::new(),
            },
            created,
        )
    }

    fn agent_meta(tags: &[&str]) -> ItemMetadata {
        ItemMetadata {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            status: "open".into(),
            author: Author {
                id: "agent-7".into(),
                author_type: AuthorType::Agent,
                display_name: "Helper".into(),
            },
            ..ItemMetadata::default()
        }
    }

    fn lexical<'a>(text: &'a str, filters: &'a SearchFilters) -> LexicalQuery<'a> {
        LexicalQuery {
            text,
            kinds: &ItemKind::ALL,
            filters,
            limit: 10,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lexical_matches_prefixes_and_ranks_by_term_coverage() {
        let store = MemoryStore::new();
        store
            .insert(post("p1", "Tokio runtime panics", 1), ItemMetadata::default())
            .await;
        store
            .insert(post("p2", "Tokio mutex deadlock in runtime", 2), ItemMetadata::default())
            .await;
        store
            .insert(post("p3", "CSS grid layout", 3), ItemMetadata::default())
            .await;

        let filters = SearchFilters::default();
        let hits = store
            .lexical_ranking(lexical("tok deadl", &filters))
            .await
            .expect("lexical");
        let ids: Vec<&str> = hits.iter().map(|h| h.key.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn filters_apply_per_kind() {
        let store = MemoryStore::new();
        store
            .insert(post("p1", "retry storm", 1_704_067_200_000), agent_meta(&["rust"]))
            .await;
        store
            .insert(
                SearchableItem::new(
                    "a1",
                    ItemContent::Answer {
                        content: "retry with jitter".into(),
                    },
                    1_704_153_600_000,
                ),
                agent_meta(&["go"]),
            )
            .await;

        let filters = SearchFilters {
            post_type: Some(PostType::Problem),
            ..SearchFilters::default()
        };
        let hits = store
            .lexical_ranking(lexical("retry", &filters))
            .await
            .expect("lexical");
        // Answers cannot express a post type, so only the question is excluded.
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.kind, ItemKind::Answer);

        let filters = SearchFilters {
            tags: vec!["rust".into(), "python".into()],
            author_type: Some(AuthorType::Agent),
            to_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..SearchFilters::default()
        };
        let hits = store
            .lexical_ranking(lexical("retry", &filters))
            .await
            .expect("lexical");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.id, "p1");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn semantic_skips_missing_and_stale_vectors() {
        let store = MemoryStore::new();
        let mut close = post("close", "a", 1);
        close.embedding = Some(vec![1.0, 0.1]);
        let mut far = post("far", "b", 2);
        far.embedding = Some(vec![0.0, 1.0]);
        let mut stale = post("stale", "c", 3);
        stale.embedding = Some(vec![1.0, 0.0, 0.0]);
        for item in [close, far, stale, post("none", "d", 4)] {
            store.insert(item, ItemMetadata::default()).await;
        }

        let filters = SearchFilters::default();
        let hits = store
            .semantic_ranking(SemanticQuery {
                embedding: &[1.0, 0.0],
                kinds: &ItemKind::ALL,
                filters: &filters,
                limit: 10,
            })
            .await
            .expect("semantic");
        let ids: Vec<&str> = hits.iter().map(|h| h.key.id.as_str()).collect();
        assert_eq!(ids, vec!["close", "far"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_batches_are_oldest_first_after_cursor() {
        let store = MemoryStore::new();
        for (id, created) in [("c", 30), ("a", 10), ("b", 20)] {
            store.insert(post(id, id, created), ItemMetadata::default()).await;
        }
        let mut done = post("done", "x", 5);
        done.embedding = Some(vec![0.5, 0.5]);
        store.insert(done, ItemMetadata::default()).await;

        assert_eq!(store.count_missing(&ItemKind::ALL, 2).await.expect("count"), 3);
        let first = store
            .next_missing_batch(&ItemKind::ALL, 2, None, 2)
            .await
            .expect("batch");
        assert_eq!(
            first.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let cursor = BackfillCursor::after(&first[1]);
        let second = store
            .next_missing_batch(&ItemKind::ALL, 2, Some(&cursor), 2)
            .await
            .expect("batch");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "c");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lexical_count_ignores_limit() {
        let store = MemoryStore::new();
        for idx in 0..15 {
            store
                .insert(post(&format!("p{idx}"), "retry storm", idx), ItemMetadata::default())
                .await;
        }
        store.insert(post("other", "grid layout", 99), ItemMetadata::default()).await;

        let filters = SearchFilters::default();
        let query = lexical("retry", &filters);
        assert_eq!(store.lexical_ranking(query).await.expect("ranking").len(), 10);
        assert_eq!(store.lexical_count(query).await.expect("count"), 15);

        store.set_lexical_unavailable(true);
        assert!(store.lexical_count(query).await.is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn items_without_text_are_never_selected() {
        let store = MemoryStore::new();
        store.insert(post("blank", "   ", 1), ItemMetadata::default()).await;
        store.insert(post("real", "text", 2), ItemMetadata::default()).await;

        assert_eq!(store.count_missing(&ItemKind::ALL, 2).await.expect("count"), 1);
        let batch = store
            .next_missing_batch(&ItemKind::ALL, 2, None, 10)
            .await
            .expect("batch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "real");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn storing_keeps_timestamps_and_rejects_unknown_items() {
        let store = MemoryStore::new();
        store.insert(post("p", "t", 7), ItemMetadata::default()).await;
        let key = ItemKey::new(ItemKind::Post, "p");
        store.store_embedding(&key, &[0.1, 0.2]).await.expect("store");
        let item = store.get(&key).await.expect("present");
        assert_eq!(item.embedding, Some(vec![0.1, 0.2]));
        assert_eq!(item.updated_epoch_ms, 7);

        let err = store
            .store_embedding(&ItemKey::new(ItemKind::Answer, "p"), &[0.1])
            .await
            .expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
