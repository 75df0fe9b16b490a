//! Searchable content units and the text each one contributes to its embedding.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DimensionMismatch;

/// Separator placed between the fields that make up an item's embedding text.
pub const FIELD_SEPARATOR: &str = "\n\n";

/// Content table an item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Problems, questions, and ideas.
    Post,
    /// Answers to questions.
    Answer,
    /// Approaches taken on problems.
    Approach,
}

impl ItemKind {
    /// Every kind, in selection order.
    pub const ALL: [ItemKind; 3] = [ItemKind::Post, ItemKind::Answer, ItemKind::Approach];

    /// Singular label used as the result `source`.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Post => "post",
            ItemKind::Answer => "answer",
            ItemKind::Approach => "approach",
        }
    }

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            ItemKind::Post => "posts",
            ItemKind::Answer => "answers",
            ItemKind::Approach => "approaches",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" | "posts" => Ok(ItemKind::Post),
            "answer" | "answers" => Ok(ItemKind::Answer),
            "approach" | "approaches" => Ok(ItemKind::Approach),
            other => Err(format!("unknown content type '{other}'")),
        }
    }
}

/// Parses a comma separated kind list; empty input selects nothing.
pub fn parse_kinds(raw: &str) -> Result<Vec<ItemKind>, String> {
    let mut kinds = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind: ItemKind = part.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

/// Flavor of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    /// Something to be solved.
    Problem,
    /// Something to be answered.
    Question,
    /// Something to be discussed.
    Idea,
}

impl PostType {
    /// Wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            PostType::Problem => "problem",
            PostType::Question => "question",
            PostType::Idea => "idea",
        }
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "problem" => Ok(PostType::Problem),
            "question" => Ok(PostType::Question),
            "idea" => Ok(PostType::Idea),
            other => Err(format!("unknown post type '{other}'")),
        }
    }
}

/// Type-specific text fields of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemContent {
    /// Post fields.
    Post {
        /// Problem/question/idea.
        post_type: PostType,
        /// Title line.
        title: String,
        /// Body.
        description: String,
    },
    /// Answer fields.
    Answer {
        /// Answer body.
        content: String,
    },
    /// Approach fields; outcome and solution are filled in as work progresses.
    Approach {
        /// Angle of attack.
        angle: String,
        /// Method used.
        method: String,
        /// Observed outcome, possibly empty.
        outcome: String,
        /// Final solution, possibly empty.
        solution: String,
    },
}

impl ItemContent {
    /// Table the content belongs to.
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemContent::Post { .. } => ItemKind::Post,
            ItemContent::Answer { .. } => ItemKind::Answer,
            ItemContent::Approach { .. } => ItemKind::Approach,
        }
    }

    /// Concatenates the fields that define the item's meaning.
    ///
    /// Posts contribute title then description, answers their content, and
    /// approaches angle then method, followed by outcome and solution only
    /// when those are non-empty.
    pub fn text_for_embedding(&self) -> String {
        let parts: Vec<&str> = match self {
            ItemContent::Post {
                title, description, ..
            } => vec![title, description],
            ItemContent::Answer { content } => vec![content],
            ItemContent::Approach {
                angle,
                method,
                outcome,
                solution,
            } => vec![angle, method, outcome, solution],
        };
        join_non_empty(&parts)
    }

    /// Human-facing title used when no better one exists.
    pub fn display_title(&self) -> &str {
        match self {
            ItemContent::Post { title, .. } => title,
            ItemContent::Answer { content } => content,
            ItemContent::Approach { angle, .. } => angle,
        }
    }
}

fn join_non_empty(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Stable identity of an item across content tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Table the item lives in.
    pub kind: ItemKind,
    /// Opaque identifier.
    pub id: String,
}

impl ItemKey {
    /// Builds a key.
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl Ord for ItemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for ItemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Any content unit eligible for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchableItem {
    /// Opaque identifier.
    pub id: String,
    /// Type-specific fields.
    pub content: ItemContent,
    /// Stored vector, if one has been generated.
    pub embedding: Option<Vec<f32>>,
    /// Creation time (ms since epoch); backfill order key.
    pub created_epoch_ms: i64,
    /// Last content update (ms since epoch); fusion tie-break key.
    pub updated_epoch_ms: i64,
}

impl SearchableItem {
    /// Creates an item without an embedding.
    pub fn new(id: impl Into<String>, content: ItemContent, created_epoch_ms: i64) -> Self {
        Self {
            id: id.into(),
            content,
            embedding: None,
            created_epoch_ms,
            updated_epoch_ms: created_epoch_ms,
        }
    }

    /// Table the item lives in.
    pub fn kind(&self) -> ItemKind {
        self.content.kind()
    }

    /// Cross-table identity.
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.kind(), self.id.clone())
    }

    /// Text submitted to the embedding provider.
    pub fn text_for_embedding(&self) -> String {
        self.content.text_for_embedding()
    }

    /// Returns the stored vector, or the mismatch if it has stale dimensionality.
    pub fn checked_embedding(&self, dims: usize) -> Result<Option<&[f32]>, DimensionMismatch> {
        match &self.embedding {
            None => Ok(None),
            Some(vector) if vector.len() == dims => Ok(Some(vector.as_slice())),
            Some(vector) => Err(DimensionMismatch {
                expected: dims,
                actual: vector.len(),
            }),
        }
    }

    /// Stored vector when it matches `dims`; a mismatch counts as absent.
    pub fn valid_embedding(&self, dims: usize) -> Option<&[f32]> {
        self.checked_embedding(dims).ok().flatten()
    }

    /// True when the item has no usable embedding for the current provider.
    pub fn needs_embedding(&self, dims: usize) -> bool {
        self.valid_embedding(dims).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approach(outcome: &str, solution: &str) -> ItemContent {
        ItemContent::Approach {
            angle: "Profile the hot loop".into(),
            method: "perf record".into(),
            outcome: outcome.into(),
            solution: solution.into(),
        }
    }

    #[test]
    fn post_text_is_title_then_description() {
        let content = ItemContent::Post {
            post_type: PostType::Question,
            title: "Why is my build slow?".into(),
            description: "Linking takes minutes.".into(),
        };
        assert_eq!(
            content.text_for_embedding(),
            "Why is my build slow?\n\nLinking takes minutes."
        );
    }

    #[test]
    fn approach_appends_outcome_and_solution_only_when_present() {
        assert_eq!(
            approach("", "").text_for_embedding(),
            "Profile the hot loop\n\nperf record"
        );
        assert_eq!(
            approach("Found allocation churn", "  ").text_for_embedding(),
            "Profile the hot loop\n\nperf record\n\nFound allocation churn"
        );
        assert_eq!(
            approach("Found churn", "Reuse buffers").text_for_embedding(),
            "Profile the hot loop\n\nperf record\n\nFound churn\n\nReuse buffers"
        );
    }

    #[test]
    fn stale_dimensions_count_as_absent() {
        let mut item = SearchableItem::new(
            "a1",
            ItemContent::Answer {
                content: "Use a mutex".into(),
            },
            10,
        );
        assert!(item.needs_embedding(3));

        item.embedding = Some(vec![0.1, 0.2]);
        assert!(item.needs_embedding(3));
        assert_eq!(
            item.checked_embedding(3),
            Err(DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );

        item.embedding = Some(vec![0.1, 0.2, 0.3]);
        assert!(!item.needs_embedding(3));
        assert_eq!(item.valid_embedding(3), Some(&[0.1, 0.2, 0.3][..]));
    }

    #[test]
    fn kinds_parse_from_plural_labels() {
        assert_eq!(
            parse_kinds("posts, approaches,posts").expect("valid"),
            vec![ItemKind::Post, ItemKind::Approach]
        );
        assert!(parse_kinds("comments").is_err());
        assert!(parse_kinds(" ").expect("empty ok").is_empty());
    }

    #[test]
    fn keys_order_by_id_then_kind() {
        let a = ItemKey::new(ItemKind::Approach, "1");
        let b = ItemKey::new(ItemKind::Post, "2");
        let c = ItemKey::new(ItemKind::Post, "1");
        let mut keys = vec![b.clone(), a.clone(), c.clone()];
        keys.sort();
        assert_eq!(keys, vec![c, a, b]);
    }
}
