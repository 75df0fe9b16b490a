//! Storage boundary: the ranking primitives search needs and the embedding columns backfill writes.

pub mod memory;
pub mod postgres;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::item::{ItemKey, ItemKind, PostType, SearchableItem};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Characters with operator meaning in a tsquery.
const TSQUERY_OPERATORS: &[char] = &['\'', '\\', ':', '(', ')', '&', '|', '!'];

/// Who wrote an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorType {
    /// Person with an account.
    #[default]
    Human,
    /// Automated agent.
    Agent,
}

impl AuthorType {
    /// Wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorType::Human => "human",
            AuthorType::Agent => "agent",
        }
    }
}

impl fmt::Display for AuthorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(AuthorType::Human),
            "agent" => Ok(AuthorType::Agent),
            other => Err(format!("unknown author type '{other}'")),
        }
    }
}

/// Author reference carried on results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Account or agent id.
    pub id: String,
    /// Human or agent.
    #[serde(rename = "type")]
    pub author_type: AuthorType,
    /// Name shown to readers; falls back to the id.
    pub display_name: String,
}

/// Non-text attributes used for filtering and result display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Tags (answers and approaches inherit their parent post's).
    pub tags: Vec<String>,
    /// Workflow status; empty when the kind has none.
    pub status: String,
    /// Author.
    pub author: Author,
    /// Upvotes minus downvotes.
    pub vote_score: i64,
    /// Answers attached to a post.
    pub answers_count: i64,
}

/// Restrictions applied to both rankings.
///
/// A restriction a content kind cannot express (e.g. post type on answers) is
/// ignored for that kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Post flavor.
    pub post_type: Option<PostType>,
    /// Match items carrying any of these tags.
    pub tags: Vec<String>,
    /// Exact status.
    pub status: Option<String>,
    /// Author id.
    pub author_id: Option<String>,
    /// Human or agent.
    pub author_type: Option<AuthorType>,
    /// Created on or after this day (UTC).
    pub from_date: Option<NaiveDate>,
    /// Created on or before this day (UTC).
    pub to_date: Option<NaiveDate>,
}

impl SearchFilters {
    /// Inclusive lower and exclusive upper creation bounds in epoch ms.
    pub fn created_bounds_ms(&self) -> (Option<i64>, Option<i64>) {
        let lower = self.from_date.and_then(day_start_ms);
        let upper = self
            .to_date
            .and_then(|day| day.succ_opt())
            .and_then(day_start_ms);
        (lower, upper)
    }
}

fn day_start_ms(day: NaiveDate) -> Option<i64> {
    day.and_hms_opt(0, 0, 0)
        .map(|start| start.and_utc().timestamp_millis())
}

/// One row of a single-method ranking, with enough data to render a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Item identity.
    pub key: ItemKey,
    /// Post type label, or the kind for answers and approaches.
    pub item_type: String,
    /// Display title.
    pub title: String,
    /// Short excerpt, highlighted where the backend supports it.
    pub snippet: String,
    /// Attributes.
    pub metadata: ItemMetadata,
    /// Creation time (ms since epoch).
    pub created_epoch_ms: i64,
    /// Last update (ms since epoch).
    pub updated_epoch_ms: i64,
    /// Backend-native relevance (text rank or cosine similarity); only
    /// comparable within one ranking.
    pub raw_score: f64,
}

/// Full-text ranking request.
#[derive(Debug, Clone, Copy)]
pub struct LexicalQuery<'a> {
    /// Raw user query.
    pub text: &'a str,
    /// Content kinds to rank.
    pub kinds: &'a [ItemKind],
    /// Restrictions.
    pub filters: &'a SearchFilters,
    /// Maximum rows returned across all kinds.
    pub limit: usize,
}

/// Vector-similarity ranking request.
#[derive(Debug, Clone, Copy)]
pub struct SemanticQuery<'a> {
    /// Query vector; items whose stored vector differs in length are skipped.
    pub embedding: &'a [f32],
    /// Content kinds to rank.
    pub kinds: &'a [ItemKind],
    /// Restrictions.
    pub filters: &'a SearchFilters,
    /// Maximum rows returned across all kinds.
    pub limit: usize,
}

/// Ranking primitives used at query time.
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Keyword ranking, best first.
    async fn lexical_ranking(&self, query: LexicalQuery<'_>) -> Result<Vec<SearchHit>, StoreError>;

    /// Number of items the keyword ranking matches, ignoring `query.limit`.
    async fn lexical_count(&self, query: LexicalQuery<'_>) -> Result<u64, StoreError>;

    /// Nearest-neighbor ranking by cosine similarity, best first.
    async fn semantic_ranking(&self, query: SemanticQuery<'_>) -> Result<Vec<SearchHit>, StoreError>;
}

/// Keyset position of the last item a backfill run selected.
///
/// Items order by `(created_epoch_ms, id, kind label)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillCursor {
    /// Creation time of the last selected item.
    pub created_epoch_ms: i64,
    /// Identity of the last selected item.
    pub key: ItemKey,
}

impl BackfillCursor {
    /// Cursor positioned at `item`.
    pub fn after(item: &SearchableItem) -> Self {
        Self {
            created_epoch_ms: item.created_epoch_ms,
            key: item.key(),
        }
    }

    /// Whether `item` sorts strictly after this cursor.
    pub fn precedes(&self, item: &SearchableItem) -> bool {
        (item.created_epoch_ms, item.id.as_str(), item.kind().as_str())
            > (
                self.created_epoch_ms,
                self.key.id.as_str(),
                self.key.kind.as_str(),
            )
    }
}

/// Embedding columns and the selection backfill needs.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Items of `kinds` with no embedding of length `dims`.
    ///
    /// Items whose embedding text is empty are never counted or selected.
    async fn count_missing(&self, kinds: &[ItemKind], dims: usize) -> Result<u64, StoreError>;

    /// Next `limit` items lacking a valid embedding, oldest first, after `cursor`.
    async fn next_missing_batch(
        &self,
        kinds: &[ItemKind],
        dims: usize,
        cursor: Option<&BackfillCursor>,
        limit: usize,
    ) -> Result<Vec<SearchableItem>, StoreError>;

    /// Overwrites the item's embedding. Content timestamps are untouched.
    async fn store_embedding(&self, key: &ItemKey, embedding: &[f32]) -> Result<(), StoreError>;
}

/// Splits a query into words with tsquery operators removed.
pub fn query_terms(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| word.replace(TSQUERY_OPERATORS, ""))
        .filter(|word| !word.is_empty())
        .collect()
}

/// Builds a prefix-matching OR tsquery (`word:* | other:*`); `None` when no words remain.
pub fn build_tsquery(text: &str) -> Option<String> {
    let terms = query_terms(text);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|term| format!("{term}:*"))
            .collect::<Vec<_>>()
            .join(" | "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemContent;

    #[test]
    fn tsquery_strips_operators_and_ors_prefixes() {
        assert_eq!(
            build_tsquery("race (condition) & it's").as_deref(),
            Some("race:* | condition:* | its:*")
        );
        assert_eq!(build_tsquery("  !!! :: "), None);
        assert_eq!(build_tsquery(""), None);
    }

    #[test]
    fn date_bounds_cover_whole_days() {
        let filters = SearchFilters {
            from_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            to_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..SearchFilters::default()
        };
        let (lower, upper) = filters.created_bounds_ms();
        assert_eq!(lower, Some(1_704_067_200_000));
        assert_eq!(upper, Some(1_704_067_200_000 + 86_400_000));
    }

    #[test]
    fn cursor_orders_by_time_then_id_then_kind() {
        let item = |id: &str, created| {
            SearchableItem::new(
                id,
                ItemContent::Answer {
                    content: "x".into(),
                },
                created,
            )
        };
        let cursor = BackfillCursor::after(&item("b", 10));
        assert!(!cursor.precedes(&item("b", 10)));
        assert!(!cursor.precedes(&item("a", 10)));
        assert!(cursor.precedes(&item("c", 10)));
        assert!(cursor.precedes(&item("a", 11)));
        assert!(!cursor.precedes(&item("z", 9)));
    }

    #[test]
    fn author_type_parses_case_insensitively() {
        assert_eq!("Agent".parse::<AuthorType>(), Ok(AuthorType::Agent));
        assert!("robot".parse::<AuthorType>().is_err());
    }
}
