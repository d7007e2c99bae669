//! Lexical/semantic rank fusion.
//!
//! The lexical side contributes a rank-based score over the union of
//! per-field candidates, boosted when the document title shares a token
//! with the query. The semantic side contributes the per-document RRF sum
//! from chunk aggregation. The two are combined with mode-dependent
//! weights: the user's active mode is the primary ranker, the other one is
//! advisory.

use super::aggregation::{score_to_percent, DocSemantic};
use super::types::FusedResult;
use crate::config::{FUSION_PRIMARY_WEIGHT, FUSION_SECONDARY_WEIGHT, RESULT_LIMIT, TITLE_BOOST};
use crate::lexical::{FieldHits, LexicalIndex};
use std::collections::{HashMap, HashSet};

/// The user-selected retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Keyword-first: lexical ranking dominates
    Lexical,
    /// Meaning-first: semantic ranking dominates
    Semantic,
}

impl SearchMode {
    /// Persisted representation (`search:mode` store key).
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Lexical => "lexical",
            SearchMode::Semantic => "semantic",
        }
    }

    /// Parses the persisted representation, defaulting to lexical.
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "semantic" => SearchMode::Semantic,
            _ => SearchMode::Lexical,
        }
    }
}

/// Fusion weights; a policy, not an algorithmic constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    /// Weight on the lexical rank score
    pub lexical: f32,
    /// Weight on the semantic RRF score
    pub semantic: f32,
}

impl FusionWeights {
    /// Weights for `mode`, given whether semantic hits are present.
    ///
    /// In lexical mode the semantic side only participates when it
    /// produced hits; in semantic mode the lexical side is always a
    /// (down-weighted) participant.
    pub fn for_mode(mode: SearchMode, has_semantic: bool) -> Self {
        match mode {
            SearchMode::Lexical => Self {
                lexical: FUSION_PRIMARY_WEIGHT,
                semantic: if has_semantic {
                    FUSION_SECONDARY_WEIGHT
                } else {
                    0.0
                },
            },
            SearchMode::Semantic => Self {
                lexical: FUSION_SECONDARY_WEIGHT,
                semantic: FUSION_PRIMARY_WEIGHT,
            },
        }
    }
}

/// A document's position in the lexical union ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalCandidate {
    /// Document slug
    pub slug: String,
    /// Display title
    pub title: String,
    /// Rank = insertion position in the cross-field union, 0-based
    pub rank: usize,
    /// Whether the title shares a token with the query
    pub title_match: bool,
}

/// Flattens per-field hits into one ranked candidate list.
///
/// Ids are unioned across fields in field order, first appearance wins;
/// the union position becomes the document's lexical rank.
pub fn rank_lexical_union(
    index: &LexicalIndex,
    hits: &[FieldHits],
    query_tokens: &[String],
) -> Vec<LexicalCandidate> {
    let mut seen: HashSet<u32> = HashSet::new();
    let mut out = Vec::new();

    for field_hits in hits {
        for &id in &field_hits.ids {
            if !seen.insert(id) {
                continue;
            }
            out.push(LexicalCandidate {
                slug: index.slug(id).to_string(),
                title: index.title(id).to_string(),
                rank: out.len(),
                title_match: index.title_matches(id, query_tokens),
            });
        }
    }

    out
}

/// Fuses the two rankings into the final top-N document list.
///
/// `final(doc) = w_lex · 1/(1 + rank_lex) · titleBoost + w_sem · rrf_sem`.
/// Sorted descending, truncated to [`RESULT_LIMIT`]. Every result carries
/// the display percentage of its best semantic chunk when one exists.
pub fn fuse(
    lexical: &[LexicalCandidate],
    semantic: &[DocSemantic],
    mode: SearchMode,
) -> Vec<FusedResult> {
    let weights = FusionWeights::for_mode(mode, !semantic.is_empty());
    fuse_weighted(lexical, semantic, weights)
}

/// [`fuse`] with explicit weights, for callers that override the policy.
pub fn fuse_weighted(
    lexical: &[LexicalCandidate],
    semantic: &[DocSemantic],
    weights: FusionWeights,
) -> Vec<FusedResult> {
    struct Entry {
        title: Option<String>,
        score: f32,
        max_sem: Option<f32>,
    }

    let mut entries: HashMap<&str, Entry> = HashMap::new();

    for candidate in lexical {
        let boost = if candidate.title_match {
            TITLE_BOOST
        } else {
            1.0
        };
        let score = weights.lexical * (1.0 / (1.0 + candidate.rank as f32)) * boost;
        entries.insert(
            candidate.slug.as_str(),
            Entry {
                title: Some(candidate.title.clone()),
                score,
                max_sem: None,
            },
        );
    }

    for doc in semantic {
        let entry = entries.entry(doc.slug.as_str()).or_insert(Entry {
            title: None,
            score: 0.0,
            max_sem: None,
        });
        entry.score += weights.semantic * doc.rrf;
        entry.max_sem = Some(doc.max_score);
    }

    let mut results: Vec<FusedResult> = entries
        .into_iter()
        .map(|(slug, entry)| FusedResult {
            slug: slug.to_string(),
            title: entry.title,
            score: entry.score,
            match_percent: entry.max_sem.map(score_to_percent),
        })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.slug.cmp(&b.slug)));
    results.truncate(RESULT_LIMIT);
    results
}
