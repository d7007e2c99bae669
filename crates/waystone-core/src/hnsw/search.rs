//! Query-time graph traversal.
//!
//! Greedy descent from the entry point through the upper levels, then a
//! beam search over the base layer with `ef = max(efDefault, 10k)` where
//! `efDefault = max(64, 4M)`. When no graph is available the search falls
//! back to an exhaustive dot-product scan, which doubles as the recall
//! oracle in tests.

use super::builder::Scored;
use super::graph::CsrGraph;
use super::visited::VisitedSet;
use super::VectorStore;
use crate::config::{EF_SEARCH_FLOOR, EF_SEARCH_K_MULTIPLIER, EF_SEARCH_M_MULTIPLIER};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Query-time beam parameters.
///
/// The `ef` formula is intentionally configurable: `M` here is the graph
/// parameter and is unrelated to the query `k`.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Lower bound on the beam width
    pub ef_floor: usize,
    /// Beam width contribution of the graph parameter: `m_multiplier * M`
    pub m_multiplier: usize,
    /// Beam width contribution of the result count: `k_multiplier * k`
    pub k_multiplier: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            ef_floor: EF_SEARCH_FLOOR,
            m_multiplier: EF_SEARCH_M_MULTIPLIER,
            k_multiplier: EF_SEARCH_K_MULTIPLIER,
        }
    }
}

impl SearchParams {
    /// Effective beam width for a graph with parameter `m` and result
    /// count `k`.
    pub fn ef(&self, m: usize, k: usize) -> usize {
        let ef_default = self.ef_floor.max(self.m_multiplier * m);
        ef_default.max(self.k_multiplier * k)
    }
}

/// Approximate top-`k` rows by dot product against `query`.
///
/// Returns `(row, score)` pairs sorted by score descending, row ascending
/// on ties.
pub fn hnsw_search(
    vectors: &VectorStore,
    graph: &CsrGraph,
    query: &[f32],
    k: usize,
    params: &SearchParams,
) -> Vec<(u32, f32)> {
    if k == 0 || vectors.rows() == 0 || graph.levels.is_empty() {
        return Vec::new();
    }

    let mut ep = graph.entry_point;
    let mut ep_score = vectors.score(ep as usize, query);

    // Greedy descent: at each upper level, hop to any strictly better
    // neighbor until none improves.
    for level in (1..=graph.max_level).rev() {
        loop {
            let mut improved = false;
            for &n in graph.neighbors(level, ep) {
                let s = vectors.score(n as usize, query);
                if s > ep_score {
                    ep = n;
                    ep_score = s;
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }
    }

    // Beam search over the base layer.
    let ef = params.ef(graph.m, k);
    let mut visited = VisitedSet::new(vectors.rows());
    visited.visit(ep as usize);

    let entry = Scored {
        score: ep_score,
        row: ep,
    };
    let mut candidates: BinaryHeap<Scored> = BinaryHeap::new();
    let mut results: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
    candidates.push(entry);
    results.push(Reverse(entry));

    while let Some(current) = candidates.pop() {
        if results.len() >= ef {
            let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::MIN);
            if current.score < worst {
                break;
            }
        }

        for &n in graph.neighbors(0, current.row) {
            if visited.is_visited(n as usize) {
                continue;
            }
            visited.visit(n as usize);

            let scored = Scored {
                score: vectors.score(n as usize, query),
                row: n,
            };
            let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::MIN);
            if results.len() < ef || scored.score > worst {
                candidates.push(scored);
                results.push(Reverse(scored));
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    let mut out: Vec<Scored> = results.into_iter().map(|r| r.0).collect();
    out.sort_unstable_by(|a, b| b.cmp(a));
    out.truncate(k);
    out.into_iter().map(|s| (s.row, s.score)).collect()
}

/// Exact top-`k` rows by exhaustive dot product.
///
/// The fallback path when the graph blob is absent or the entry point is
/// negative, and the correctness oracle for the approximate search.
pub fn brute_force_search(vectors: &VectorStore, query: &[f32], k: usize) -> Vec<(u32, f32)> {
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<Scored> = (0..vectors.rows())
        .map(|row| Scored {
            score: vectors.score(row, query),
            row: row as u32,
        })
        .collect();
    scored.sort_unstable_by(|a, b| b.cmp(a));
    scored.truncate(k);
    scored.into_iter().map(|s| (s.row, s.score)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::builder::{HnswBuilder, HnswParams};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }

    fn axis_store() -> VectorStore {
        let mut store = VectorStore::new(3);
        store.push(&[1.0, 0.0, 0.0]);
        store.push(&[0.0, 1.0, 0.0]);
        store.push(&unit(vec![1.0, 0.1, 0.0]));
        store.push(&[0.0, 0.0, 1.0]);
        store
    }

    #[test]
    fn test_ef_formula() {
        let params = SearchParams::default();
        // efDefault = max(64, 4*16) = 64 for M=16; 10k dominates for k=10.
        assert_eq!(params.ef(16, 1), 64);
        assert_eq!(params.ef(16, 10), 100);
        assert_eq!(params.ef(32, 1), 128);
    }

    #[test]
    fn test_brute_force_orders_by_score() {
        let store = axis_store();
        let results = brute_force_search(&store, &[1.0, 0.0, 0.0], 3);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 2);
        assert!(results[0].1 > results[1].1);
        assert!(results[1].1 > results[2].1);
    }

    #[test]
    fn test_brute_force_ties_break_by_row_id() {
        let mut store = VectorStore::new(2);
        store.push(&[1.0, 0.0]);
        store.push(&[1.0, 0.0]);
        store.push(&[0.0, 1.0]);
        let results = brute_force_search(&store, &[1.0, 0.0], 2);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
    }

    #[test]
    fn test_brute_force_k_zero() {
        let store = axis_store();
        assert!(brute_force_search(&store, &[1.0, 0.0, 0.0], 0).is_empty());
    }

    #[test]
    fn test_hnsw_finds_exact_match() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut store = VectorStore::new(16);
        for _ in 0..200 {
            let v: Vec<f32> = (0..16).map(|_| rng.gen::<f32>() - 0.5).collect();
            store.push(&unit(v));
        }
        let graph = HnswBuilder::build(&store, HnswParams::default()).to_csr();

        for probe in [0usize, 42, 199] {
            let query = store.row(probe).to_vec();
            let results = hnsw_search(&store, &graph, &query, 1, &SearchParams::default());
            assert_eq!(results[0].0 as usize, probe);
            assert!((results[0].1 - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_hnsw_matches_brute_force_on_small_sets() {
        // With ef >= rows the beam search degenerates to exhaustive and
        // must agree with the oracle exactly.
        let mut rng = StdRng::seed_from_u64(13);
        let mut store = VectorStore::new(8);
        for _ in 0..50 {
            let v: Vec<f32> = (0..8).map(|_| rng.gen::<f32>() - 0.5).collect();
            store.push(&unit(v));
        }
        let graph = HnswBuilder::build(&store, HnswParams::default()).to_csr();

        for seed in 0..10 {
            let mut qrng = StdRng::seed_from_u64(seed);
            let q: Vec<f32> = unit((0..8).map(|_| qrng.gen::<f32>() - 0.5).collect());
            let approx = hnsw_search(&store, &graph, &q, 5, &SearchParams::default());
            let exact = brute_force_search(&store, &q, 5);
            let approx_rows: Vec<u32> = approx.iter().map(|(r, _)| *r).collect();
            let exact_rows: Vec<u32> = exact.iter().map(|(r, _)| *r).collect();
            assert_eq!(approx_rows, exact_rows, "seed {seed}");
        }
    }

    #[test]
    fn test_hnsw_empty_graph_returns_nothing() {
        let store = VectorStore::new(4);
        let graph = CsrGraph {
            levels: vec![],
            entry_point: 0,
            max_level: 0,
            m: 16,
        };
        assert!(hnsw_search(&store, &graph, &[0.0; 4], 5, &Default::default()).is_empty());
    }

    #[test]
    fn test_hnsw_k_larger_than_rows() {
        let store = axis_store();
        let graph = HnswBuilder::build(&store, HnswParams::default()).to_csr();
        let results = hnsw_search(&store, &graph, &[1.0, 0.0, 0.0], 100, &Default::default());
        assert_eq!(results.len(), 4);
    }
}
