//! Reciprocal Rank Fusion of a lexical and a semantic ranking.
//!
//! Pure and stateless: identical inputs always give identical output, tie-breaks included.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::config::FusionConfig;
use crate::item::ItemKey;

/// Ranking an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSource {
    /// Full-text ranking.
    Lexical,
    /// Vector-similarity ranking.
    Semantic,
}

/// One item's 1-based position in a single-method ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    /// Item identity.
    pub key: ItemKey,
    /// 1-based position.
    pub rank: usize,
    /// Last update time, used for tie-breaks.
    pub updated_epoch_ms: i64,
}

impl RankingEntry {
    /// Builds an entry.
    pub fn new(key: ItemKey, rank: usize, updated_epoch_ms: i64) -> Self {
        Self {
            key,
            rank,
            updated_epoch_ms,
        }
    }
}

/// Final per-item output. `score` only orders results within one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    /// Item identity.
    pub key: ItemKey,
    /// Sum of per-method contributions.
    pub score: f64,
    /// Position in the lexical ranking, if present.
    pub lexical_rank: Option<usize>,
    /// Position in the semantic ranking, if present.
    pub semantic_rank: Option<usize>,
    /// Tie-break key.
    pub updated_epoch_ms: i64,
}

impl FusedResult {
    fn new(key: ItemKey, updated_epoch_ms: i64) -> Self {
        Self {
            key,
            score: 0.0,
            lexical_rank: None,
            semantic_rank: None,
            updated_epoch_ms,
        }
    }

    /// Rankings the item appeared in, lexical first.
    pub fn methods(&self) -> Vec<RankSource> {
        let mut methods = Vec::with_capacity(2);
        if self.lexical_rank.is_some() {
            methods.push(RankSource::Lexical);
        }
        if self.semantic_rank.is_some() {
            methods.push(RankSource::Semantic);
        }
        methods
    }
}

/// `weight / (k + rank)`.
pub fn rrf_contribution(k: f64, weight: f64, rank: usize) -> f64 {
    weight / (k + rank as f64)
}

/// Fuses two rankings into one total order.
///
/// Absent items contribute zero for that method. Equal scores order by newer
/// `updated_epoch_ms`, then by [`ItemKey`]. When `semantic` is empty the
/// result keeps the lexical order exactly. If a key repeats within one
/// ranking only its best position counts.
pub fn fuse(
    lexical: &[RankingEntry],
    semantic: &[RankingEntry],
    config: &FusionConfig,
) -> Vec<FusedResult> {
    let mut map: HashMap<ItemKey, FusedResult> =
        HashMap::with_capacity(lexical.len() + semantic.len());
    for (source, ranking) in [
        (RankSource::Lexical, lexical),
        (RankSource::Semantic, semantic),
    ] {
        for entry in ranking {
            let candidate = map
                .entry(entry.key.clone())
                .or_insert_with(|| FusedResult::new(entry.key.clone(), entry.updated_epoch_ms));
            candidate.updated_epoch_ms = candidate.updated_epoch_ms.max(entry.updated_epoch_ms);
            let slot = match source {
                RankSource::Lexical => &mut candidate.lexical_rank,
                RankSource::Semantic => &mut candidate.semantic_rank,
            };
            *slot = Some(slot.map_or(entry.rank, |existing| existing.min(entry.rank)));
        }
    }

    let mut fused: Vec<FusedResult> = map
        .into_values()
        .map(|mut candidate| {
            candidate.score = candidate
                .lexical_rank
                .map_or(0.0, |rank| rrf_contribution(config.k, config.lexical_weight, rank))
                + candidate
                    .semantic_rank
                    .map_or(0.0, |rank| rrf_contribution(config.k, config.semantic_weight, rank));
            candidate
        })
        .collect();
    fused.sort_by(compare_fused);
    fused
}

fn compare_fused(a: &FusedResult, b: &FusedResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.updated_epoch_ms.cmp(&a.updated_epoch_ms))
        .then_with(|| a.key.cmp(&b.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemKind;

    fn ranking(ids: &[&str]) -> Vec<RankingEntry> {
        ids.iter()
            .enumerate()
            .map(|(idx, id)| RankingEntry::new(ItemKey::new(ItemKind::Post, *id), idx + 1, 0))
            .collect()
    }

    fn ids(results: &[FusedResult]) -> Vec<&str> {
        results.iter().map(|r| r.key.id.as_str()).collect()
    }

    #[test]
    fn lexical_only_keeps_lexical_order() {
        let lexical = ranking(&["p9", "p2", "p7", "p1", "p5"]);
        let fused = fuse(&lexical, &[], &FusionConfig::default());
        assert_eq!(ids(&fused), vec!["p9", "p2", "p7", "p1", "p5"]);
        assert!(fused
            .iter()
            .all(|r| r.methods() == vec![RankSource::Lexical]));
    }

    #[test]
    fn lexical_only_order_ignores_recency() {
        let lexical: Vec<RankingEntry> = ["old", "new"]
            .iter()
            .enumerate()
            .map(|(idx, id)| {
                RankingEntry::new(
                    ItemKey::new(ItemKind::Answer, *id),
                    idx + 1,
                    if *id == "new" { 10_000 } else { 1 },
                )
            })
            .collect();
        let fused = fuse(&lexical, &[], &FusionConfig::default());
        assert_eq!(ids(&fused), vec!["old", "new"]);
    }

    #[test]
    fn every_accepted_lexical_weight_keeps_lexical_order() {
        let lexical: Vec<RankingEntry> = ["first", "second"]
            .iter()
            .enumerate()
            .map(|(idx, id)| RankingEntry::new(ItemKey::new(ItemKind::Post, *id), idx + 1, idx as i64))
            .collect();
        for lexical_weight in [1e-9, 0.5, 3.0] {
            let config = FusionConfig {
                lexical_weight,
                semantic_weight: 0.0,
                ..FusionConfig::default()
            };
            config.validate().expect("accepted");
            assert_eq!(ids(&fuse(&lexical, &[], &config)), vec!["first", "second"]);
        }

        let flattened = FusionConfig {
            lexical_weight: 0.0,
            ..FusionConfig::default()
        };
        assert!(flattened.validate().is_err());
    }

    #[test]
    fn presence_in_both_beats_single_rank_one() {
        let lexical = ranking(&["b", "x1", "x2", "x3", "a"]);
        let semantic = ranking(&["y1", "y2", "a"]);
        let fused = fuse(&lexical, &semantic, &FusionConfig::default());
        let pos = |id: &str| fused.iter().position(|r| r.key.id == id).expect("present");
        assert!(pos("a") < pos("b"));

        let a = &fused[pos("a")];
        assert!((a.score - (1.0 / 65.0 + 1.0 / 63.0)).abs() < 1e-12);
        assert_eq!(a.lexical_rank, Some(5));
        assert_eq!(a.semantic_rank, Some(3));
        assert_eq!(a.methods(), vec![RankSource::Lexical, RankSource::Semantic]);
    }

    #[test]
    fn ties_break_by_recency_then_key() {
        let key = |id: &str| ItemKey::new(ItemKind::Post, id);
        let lexical = vec![
            RankingEntry::new(key("c"), 1, 100),
            RankingEntry::new(key("z"), 2, 300),
        ];
        let semantic = vec![
            RankingEntry::new(key("z"), 1, 300),
            RankingEntry::new(key("c"), 2, 100),
            RankingEntry::new(key("b"), 3, 50),
        ];
        let mut lexical_b = lexical.clone();
        lexical_b.push(RankingEntry::new(key("a"), 3, 50));

        let fused = fuse(&lexical_b, &semantic, &FusionConfig::default());
        // c and z tie on score; z is newer. a and b tie on score and time.
        assert_eq!(ids(&fused), vec!["z", "c", "a", "b"]);
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let lexical = ranking(&["a", "b", "c", "d"]);
        let semantic = ranking(&["d", "c", "e", "a"]);
        let config = FusionConfig::default();
        let first = fuse(&lexical, &semantic, &config);
        for _ in 0..10 {
            assert_eq!(fuse(&lexical, &semantic, &config), first);
        }
    }

    #[test]
    fn weights_scale_contributions() {
        let lexical = ranking(&["lex"]);
        let semantic = ranking(&["sem"]);
        let config = FusionConfig {
            semantic_weight: 2.0,
            ..FusionConfig::default()
        };
        let fused = fuse(&lexical, &semantic, &config);
        assert_eq!(ids(&fused), vec!["sem", "lex"]);
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn repeated_key_keeps_best_rank() {
        let key = ItemKey::new(ItemKind::Post, "dup");
        let lexical = vec![
            RankingEntry::new(key.clone(), 1, 0),
            RankingEntry::new(key, 4, 0),
        ];
        let fused = fuse(&lexical, &[], &FusionConfig::default());
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].lexical_rank, Some(1));
    }

    #[test]
    fn same_id_in_different_tables_stays_distinct() {
        let lexical = vec![
            RankingEntry::new(ItemKey::new(ItemKind::Post, "1"), 1, 0),
            RankingEntry::new(ItemKey::new(ItemKind::Answer, "1"), 2, 0),
        ];
        let fused = fuse(&lexical, &[], &FusionConfig::default());
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].key.kind, ItemKind::Post);
    }
}
