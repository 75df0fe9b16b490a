//! Search orchestration: time-boxed query embedding, concurrent rankings, fusion, pagination.
//!
//! A request moves through `received -> embedding attempted -> lexical-only | hybrid
//! -> fused -> returned`. Anything that goes wrong on the semantic side demotes the
//! request to full-text; only a lexical failure reaches the caller.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{SearchConfig, DEFAULT_PER_PAGE, MAX_CANDIDATE_POOL, MAX_PAGE, MAX_PER_PAGE};
use crate::error::{SearchError, StoreError};
use crate::fusion::{fuse, FusedResult, RankSource, RankingEntry};
use crate::generator::EmbeddingGenerator;
use crate::item::{ItemKey, ItemKind};
use crate::store::{Author, LexicalQuery, SearchFilters, SearchHit, SearchStore, SemanticQuery};
use crate::telemetry;

/// Result ordering requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Fused relevance order.
    #[default]
    Relevance,
    /// Creation time, newest first.
    Newest,
    /// Vote score, then creation time.
    Votes,
    /// Last update, most recent first.
    Activity,
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "relevance" => Ok(SortMode::Relevance),
            "newest" => Ok(SortMode::Newest),
            "votes" => Ok(SortMode::Votes),
            "activity" => Ok(SortMode::Activity),
            other => Err(format!("unknown sort '{other}'")),
        }
    }
}

/// Which rankings contributed to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Lexical and semantic rankings were both fused.
    Hybrid,
    /// Only the lexical ranking was available.
    Fulltext,
}

impl SearchMethod {
    /// Wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMethod::Hybrid => "hybrid",
            SearchMethod::Fulltext => "fulltext",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Restrictions applied to both rankings.
    pub filters: SearchFilters,
    /// Content kinds to search; empty means posts only.
    pub content_types: Vec<ItemKind>,
    /// Ordering of the fused set.
    pub sort: SortMode,
    /// 1-based page, clamped to [`MAX_PAGE`].
    pub page: usize,
    /// Page size, capped at [`MAX_PER_PAGE`].
    pub per_page: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            filters: SearchFilters::default(),
            content_types: Vec::new(),
            sort: SortMode::Relevance,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl SearchOptions {
    fn page(&self) -> usize {
        self.page.clamp(1, MAX_PAGE)
    }

    fn per_page(&self) -> usize {
        match self.per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        }
    }

    fn kinds(&self) -> Vec<ItemKind> {
        if self.content_types.is_empty() {
            vec![ItemKind::Post]
        } else {
            self.content_types.clone()
        }
    }
}

/// One rendered result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Item id.
    pub id: String,
    /// Post type, or the kind for answers and approaches.
    #[serde(rename = "type")]
    pub item_type: String,
    /// Display title.
    pub title: String,
    /// Excerpt.
    pub snippet: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Status.
    pub status: String,
    /// Author.
    pub author: Author,
    /// Fused score; only meaningful within this response.
    pub score: f64,
    /// Upvotes minus downvotes.
    pub vote_score: i64,
    /// Answers on a post.
    pub answers_count: i64,
    /// Creation time (ms since epoch).
    pub created_at: i64,
    /// Content table.
    pub source: ItemKind,
    /// Rankings the item appeared in.
    pub methods: Vec<RankSource>,
}

/// Response envelope metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMeta {
    /// Query as received.
    pub query: String,
    /// Fused candidates before pagination.
    pub total: usize,
    /// Page served.
    pub page: usize,
    /// Effective page size.
    pub per_page: usize,
    /// Whether another page exists.
    pub has_more: bool,
    /// Wall time spent.
    pub took_ms: u64,
    /// Which rankings contributed.
    pub method: SearchMethod,
}

/// Paginated results plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    /// Results for the requested page.
    pub data: Vec<SearchResult>,
    /// Envelope metadata.
    pub meta: SearchMeta,
}

type EmbeddingCache = Mutex<LruCache<String, Vec<f32>>>;

/// Entry point for queries.
pub struct SearchOrchestrator {
    store: Arc<dyn SearchStore>,
    generator: Option<EmbeddingGenerator>,
    config: SearchConfig,
    cache: Option<EmbeddingCache>,
}

impl SearchOrchestrator {
    /// Without a generator every request is served full-text.
    pub fn new(
        store: Arc<dyn SearchStore>,
        generator: Option<EmbeddingGenerator>,
        config: SearchConfig,
    ) -> Self {
        let cache = NonZeroUsize::new(config.embedding_cache_size)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            store,
            generator,
            config,
            cache,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Runs one query.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let text = query.trim();
        if text.is_empty() {
            return Err(SearchError::InvalidQuery("query must not be empty".into()));
        }
        let page = options.page();
        let per_page = options.per_page();
        let kinds = options.kinds();
        let offset = (page - 1) * per_page;
        // One row past the page so the last page is recognized as such.
        let pool = self
            .config
            .candidate_pool
            .max(offset + per_page + 1)
            .min(MAX_CANDIDATE_POOL);

        let lexical = self.lexical_hits(LexicalQuery {
            text,
            kinds: &kinds,
            filters: &options.filters,
            limit: pool,
        });
        let semantic = self.semantic_hits(text, &kinds, &options.filters, pool);
        let (lexical, semantic) = tokio::join!(lexical, semantic);

        let (lexical, lexical_total) = lexical.map_err(|err| {
            telemetry::lexical_query_failed(&err);
            SearchError::Lexical(err)
        })?;
        let method = if semantic.is_some() {
            SearchMethod::Hybrid
        } else {
            SearchMethod::Fulltext
        };
        let semantic = semantic.unwrap_or_default();

        let lexical_entries = ranking_entries(&lexical);
        let semantic_entries = ranking_entries(&semantic);
        let mut hits: HashMap<ItemKey, SearchHit> = HashMap::with_capacity(lexical.len() + semantic.len());
        // Lexical rows carry highlighted snippets, so they win.
        for hit in lexical.into_iter().chain(semantic) {
            hits.entry(hit.key.clone()).or_insert(hit);
        }

        let mut fused = fuse(&lexical_entries, &semantic_entries, &self.config.fusion);
        apply_sort(&mut fused, &hits, options.sort);

        // Every full-text match counts, not just the fetched pool; semantic-only
        // candidates are added on top since the similarity ranking has no match set.
        let semantic_only = fused.iter().filter(|r| r.lexical_rank.is_none()).count();
        let total = usize::try_from(lexical_total)
            .unwrap_or(usize::MAX)
            .max(lexical_entries.len())
            .saturating_add(semantic_only);
        let data: Vec<SearchResult> = fused
            .into_iter()
            .skip(offset)
            .take(per_page)
            .filter_map(|result| {
                let hit = hits.remove(&result.key)?;
                Some(render(result, hit))
            })
            .collect();

        let took = started.elapsed();
        telemetry::search_completed(text, took, data.len(), total, method);
        Ok(SearchResponse {
            data,
            meta: SearchMeta {
                query: query.to_string(),
                total,
                page,
                per_page,
                has_more: offset + per_page < total,
                took_ms: took.as_millis() as u64,
                method,
            },
        })
    }

    async fn lexical_hits(
        &self,
        query: LexicalQuery<'_>,
    ) -> Result<(Vec<SearchHit>, u64), StoreError> {
        let budget = self.config.store_timeout;
        let calls = async {
            tokio::try_join!(
                self.store.lexical_ranking(query),
                self.store.lexical_count(query)
            )
        };
        match tokio::time::timeout(budget, calls).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(budget)),
        }
    }

    // `None` means the semantic side did not contribute.
    async fn semantic_hits(
        &self,
        text: &str,
        kinds: &[ItemKind],
        filters: &SearchFilters,
        limit: usize,
    ) -> Option<Vec<SearchHit>> {
        let embedding = self.query_embedding(text).await?;
        let budget = self.config.store_timeout;
        let ranking = self.store.semantic_ranking(SemanticQuery {
            embedding: &embedding,
            kinds,
            filters,
            limit,
        });
        match tokio::time::timeout(budget, ranking).await {
            Ok(Ok(hits)) => Some(hits),
            Ok(Err(err)) => {
                telemetry::semantic_ranking_failed(&err);
                None
            }
            Err(_) => {
                telemetry::semantic_ranking_timed_out(budget);
                None
            }
        }
    }

    async fn query_embedding(&self, text: &str) -> Option<Vec<f32>> {
        if !self.config.semantic_enabled {
            return None;
        }
        let generator = self.generator.as_ref()?;
        let started = Instant::now();
        let cache_key = normalize_query(text);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().await.get(&cache_key).cloned() {
                telemetry::query_embedding_generated(started.elapsed(), true);
                return Some(hit);
            }
        }

        let budget = self.config.query_embed_timeout;
        match tokio::time::timeout(budget, generator.embed_query(text)).await {
            Ok(Ok(embedding)) => {
                telemetry::query_embedding_generated(started.elapsed(), false);
                if let Some(cache) = &self.cache {
                    cache.lock().await.put(cache_key, embedding.clone());
                }
                Some(embedding)
            }
            Ok(Err(err)) => {
                telemetry::query_embedding_failed(&err);
                None
            }
            Err(_) => {
                telemetry::query_embedding_timed_out(budget);
                None
            }
        }
    }
}

fn normalize_query(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ranking_entries(hits: &[SearchHit]) -> Vec<RankingEntry> {
    hits.iter()
        .enumerate()
        .map(|(idx, hit)| RankingEntry::new(hit.key.clone(), idx + 1, hit.updated_epoch_ms))
        .collect()
}

fn apply_sort(fused: &mut [FusedResult], hits: &HashMap<ItemKey, SearchHit>, sort: SortMode) {
    let field = |result: &FusedResult, f: fn(&SearchHit) -> i64| {
        hits.get(&result.key).map(f).unwrap_or(i64::MIN)
    };
    match sort {
        SortMode::Relevance => {}
        SortMode::Newest => {
            fused.sort_by_key(|r| std::cmp::Reverse(field(r, |h| h.created_epoch_ms)));
        }
        SortMode::Votes => fused.sort_by_key(|r| {
            std::cmp::Reverse((
                field(r, |h| h.metadata.vote_score),
                field(r, |h| h.created_epoch_ms),
            ))
        }),
        SortMode::Activity => {
            fused.sort_by_key(|r| std::cmp::Reverse(field(r, |h| h.updated_epoch_ms)));
        }
    }
}

fn render(result: FusedResult, hit: SearchHit) -> SearchResult {
    let methods = result.methods();
    SearchResult {
        id: hit.key.id,
        item_type: hit.item_type,
        title: hit.title,
        snippet: hit.snippet,
        tags: hit.metadata.tags,
        status: hit.metadata.status,
        author: hit.metadata.author,
        score: result.score,
        vote_score: hit.metadata.vote_score,
        answers_count: hit.metadata.answers_count,
        created_at: hit.created_epoch_ms,
        source: hit.key.kind,
        methods,
    }
}
