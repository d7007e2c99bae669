//! Chunk → document aggregation for semantic results.
//!
//! The vector index works at chunk granularity; search results are shown
//! per document. Raw hits are grouped by parent slug via the manifest's
//! chunk metadata, and each document's chunks contribute a reciprocal-rank
//! sum so a document with several relevant passages outranks one with a
//! single equally-good passage. The best chunk score is carried along for
//! display.

use super::types::SemanticHit;
use crate::config::RRF_K;
use crate::index::ChunkRef;
use std::collections::HashMap;

/// Document-level view of the semantic hits.
#[derive(Debug, Clone, PartialEq)]
pub struct DocSemantic {
    /// Parent document slug
    pub slug: String,
    /// `Σ 1/(RRF_K + r)` over the document's chunk ranks `r = 0, 1, …`
    pub rrf: f32,
    /// Score of the document's best chunk
    pub max_score: f32,
}

/// Groups chunk hits by parent document and computes per-document RRF.
///
/// A chunk slug absent from `chunk_metadata` is its own parent, which
/// covers both unchunked documents and indexes built without the map.
/// Output is sorted by `rrf` descending.
pub fn aggregate_by_document(
    hits: &[SemanticHit],
    chunk_metadata: Option<&HashMap<String, ChunkRef>>,
) -> Vec<DocSemantic> {
    let mut per_doc: HashMap<&str, Vec<f32>> = HashMap::new();

    for hit in hits {
        let parent = chunk_metadata
            .and_then(|m| m.get(&hit.id))
            .map(|r| r.parent_slug.as_str())
            .unwrap_or(&hit.id);
        per_doc.entry(parent).or_default().push(hit.score);
    }

    let mut docs: Vec<DocSemantic> = per_doc
        .into_iter()
        .map(|(slug, mut scores)| {
            scores.sort_by(|a, b| b.total_cmp(a));
            let rrf = (0..scores.len())
                .map(|rank| 1.0 / (RRF_K + rank as f32))
                .sum();
            DocSemantic {
                slug: slug.to_string(),
                rrf,
                max_score: scores[0],
            }
        })
        .collect();

    docs.sort_by(|a, b| b.rrf.total_cmp(&a.rrf).then_with(|| a.slug.cmp(&b.slug)));
    docs
}

/// Maps a cosine similarity to a display percentage.
///
/// Affine map `(clamp(s, -1, 1) + 1) / 2 · 100`; display only, never used
/// for ranking.
pub fn score_to_percent(score: f32) -> f32 {
    (score.clamp(-1.0, 1.0) + 1.0) / 2.0 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32) -> SemanticHit {
        SemanticHit {
            id: id.to_string(),
            score,
        }
    }

    fn meta(entries: &[(&str, &str, usize)]) -> HashMap<String, ChunkRef> {
        entries
            .iter()
            .map(|(chunk, parent, chunk_id)| {
                (
                    chunk.to_string(),
                    ChunkRef {
                        parent_slug: parent.to_string(),
                        chunk_id: *chunk_id,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_chunks_group_to_parent() {
        let m = meta(&[
            ("doc#chunk3", "doc", 3),
            ("doc#chunk7", "doc", 7),
            ("other#chunk0", "other", 0),
        ]);
        let hits = vec![
            hit("doc#chunk3", 0.9),
            hit("other#chunk0", 0.8),
            hit("doc#chunk7", 0.7),
        ];

        let docs = aggregate_by_document(&hits, Some(&m));
        assert_eq!(docs.len(), 2);

        let doc = docs.iter().find(|d| d.slug == "doc").unwrap();
        // Two chunks at ranks 0 and 1: 1/60 + 1/61.
        let expected = 1.0 / 60.0 + 1.0 / 61.0;
        assert!((doc.rrf - expected).abs() < 1e-6);
        assert_eq!(doc.max_score, 0.9);
    }

    #[test]
    fn test_rrf_series_over_many_chunks() {
        let m = meta(&[
            ("d#chunk0", "d", 0),
            ("d#chunk1", "d", 1),
            ("d#chunk2", "d", 2),
        ]);
        let hits = vec![
            hit("d#chunk1", 0.5),
            hit("d#chunk0", 0.9),
            hit("d#chunk2", 0.1),
        ];

        let docs = aggregate_by_document(&hits, Some(&m));
        let expected: f32 = (0..3).map(|r| 1.0 / (60.0 + r as f32)).sum();
        assert!((docs[0].rrf - expected).abs() < 1e-6);
        // Max comes from the best chunk regardless of hit order.
        assert_eq!(docs[0].max_score, 0.9);
    }

    #[test]
    fn test_unmapped_chunk_is_its_own_document() {
        let hits = vec![hit("standalone", 0.6)];
        let docs = aggregate_by_document(&hits, None);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].slug, "standalone");
        assert!((docs[0].rrf - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_map_entry_falls_back_to_identity() {
        let m = meta(&[("known#chunk0", "known", 0)]);
        let hits = vec![hit("known#chunk0", 0.9), hit("stray", 0.8)];
        let docs = aggregate_by_document(&hits, Some(&m));
        assert!(docs.iter().any(|d| d.slug == "known"));
        assert!(docs.iter().any(|d| d.slug == "stray"));
    }

    #[test]
    fn test_more_chunks_outrank_single_better_chunk_at_equal_rank() {
        let m = meta(&[("a#chunk0", "a", 0), ("a#chunk1", "a", 1), ("b#chunk0", "b", 0)]);
        let hits = vec![
            hit("b#chunk0", 0.95),
            hit("a#chunk0", 0.9),
            hit("a#chunk1", 0.85),
        ];
        let docs = aggregate_by_document(&hits, Some(&m));
        // Per-document ranks reset to 0, so doc "a" gets 1/60 + 1/61 versus
        // "b"'s single 1/60.
        assert_eq!(docs[0].slug, "a");
    }

    #[test]
    fn test_empty_hits() {
        assert!(aggregate_by_document(&[], None).is_empty());
    }

    #[test]
    fn test_score_to_percent_bounds() {
        assert_eq!(score_to_percent(1.0), 100.0);
        assert_eq!(score_to_percent(-1.0), 0.0);
        assert_eq!(score_to_percent(0.0), 50.0);
        // Out-of-range similarities clamp instead of overflowing the scale.
        assert_eq!(score_to_percent(1.5), 100.0);
        assert_eq!(score_to_percent(-2.0), 0.0);
    }
}
