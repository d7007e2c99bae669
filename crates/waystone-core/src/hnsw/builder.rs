//! HNSW graph construction.
//!
//! Standard insertion algorithm: each new row draws a random level from an
//! exponential distribution, descends greedily from the entry point to its
//! level, then at each level from there down to 0 runs a beam search with
//! `ef_construction` candidates, picks up to the edge budget of neighbors
//! with the diversity heuristic, and wires bidirectional edges. Neighbors
//! pushed over budget are pruned back down with the same heuristic, and the
//! reverse edge of every pruned edge is dropped too, so the finished graph
//! is symmetric with no duplicates and no self-loops.
//!
//! Tie-breaks are deterministic everywhere: higher similarity first, lower
//! row id on equal similarity. Builds with the same seed over the same rows
//! produce identical graphs.

use super::graph::{CsrGraph, CsrLevel};
use super::visited::VisitedSet;
use super::VectorStore;
use crate::config::{HNSW_EF_CONSTRUCTION, HNSW_M};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{debug, info};

/// Levels are capped to keep a degenerate RNG draw from allocating an
/// absurd tower; with mL = 1/ln(16) the probability of even level 12 is
/// below 1e-15.
const MAX_LEVEL_CAP: usize = 32;

/// Construction parameters.
#[derive(Debug, Clone)]
pub struct HnswParams {
    /// Edge budget per node per level; level 0 uses `2 * m`
    pub m: usize,
    /// Beam width during construction
    pub ef_construction: usize,
    /// RNG seed for level assignment
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: HNSW_M,
            ef_construction: HNSW_EF_CONSTRUCTION,
            seed: 0,
        }
    }
}

/// A row with its similarity to some query; orders by score descending,
/// then by row id ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Scored {
    pub score: f32,
    pub row: u32,
}

impl Eq for Scored {}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.row.cmp(&self.row))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// HNSW builder over a fixed vector set.
pub struct HnswBuilder<'a> {
    vectors: &'a VectorStore,
    params: HnswParams,
    /// `levels[l][row]` = neighbor list of `row` at level `l`
    levels: Vec<Vec<Vec<u32>>>,
    /// Highest level each inserted row participates in
    node_levels: Vec<usize>,
    entry_point: Option<u32>,
    max_level: usize,
    ml: f64,
    rng: StdRng,
    visited: VisitedSet,
}

impl<'a> HnswBuilder<'a> {
    /// Builds the full graph over every row of `vectors`.
    pub fn build(vectors: &'a VectorStore, params: HnswParams) -> BuiltGraph {
        let rows = vectors.rows();
        let ml = 1.0 / (params.m.max(2) as f64).ln();
        let mut builder = Self {
            vectors,
            rng: StdRng::seed_from_u64(params.seed),
            params,
            levels: Vec::new(),
            node_levels: Vec::with_capacity(rows),
            entry_point: None,
            max_level: 0,
            ml,
            visited: VisitedSet::new(rows),
        };

        for row in 0..rows {
            builder.insert(row as u32);
            if row > 0 && row % 10_000 == 0 {
                debug!(inserted = row, total = rows, "hnsw build progress");
            }
        }

        info!(
            rows,
            max_level = builder.max_level,
            m = builder.params.m,
            ef_construction = builder.params.ef_construction,
            "built hnsw graph"
        );

        BuiltGraph {
            levels: builder.levels,
            entry_point: builder.entry_point.map(|e| e as i64).unwrap_or(-1),
            max_level: builder.max_level,
            m: builder.params.m,
            ef_construction: builder.params.ef_construction,
            rows,
        }
    }

    /// Draws a level from the exponential distribution `⌊-ln(U) · mL⌋`.
    fn assign_level(&mut self) -> usize {
        let u: f64 = self.rng.gen::<f64>().max(f64::MIN_POSITIVE);
        ((-u.ln() * self.ml).floor() as usize).min(MAX_LEVEL_CAP)
    }

    fn budget(&self, level: usize) -> usize {
        if level == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    fn ensure_levels(&mut self, level: usize) {
        let rows = self.vectors.rows();
        while self.levels.len() <= level {
            self.levels.push(vec![Vec::new(); rows]);
        }
    }

    fn insert(&mut self, row: u32) {
        let level = self.assign_level();
        self.node_levels.push(level);

        let Some(entry) = self.entry_point else {
            // First row seeds the graph.
            self.ensure_levels(level);
            self.entry_point = Some(row);
            self.max_level = level;
            return;
        };

        let query = self.vectors.row(row as usize).to_vec();
        let mut ep = entry;

        // Zoom in through the levels above the new node's level.
        for l in (level + 1..=self.max_level).rev() {
            ep = self.greedy_step(&query, ep, l);
        }

        // Wire connections from min(level, max_level) down to the base.
        for l in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(&query, ep, self.params.ef_construction, l);
            let budget = self.budget(l);

            let peers: Vec<Scored> = candidates
                .iter()
                .copied()
                .filter(|c| c.row != row)
                .collect();
            let selected = self.select_neighbors(&peers, budget);

            for neighbor in &selected {
                self.add_edge(l, row, neighbor.row);
            }
            for neighbor in &selected {
                self.prune(l, neighbor.row);
            }

            if let Some(best) = candidates.first() {
                ep = best.row;
            }
        }

        if level > self.max_level {
            self.ensure_levels(level);
            self.max_level = level;
            self.entry_point = Some(row);
        }
    }

    /// Greedy descent step: move to the best-scoring neighbor until no
    /// neighbor improves on the current node.
    fn greedy_step(&mut self, query: &[f32], mut ep: u32, level: usize) -> u32 {
        let mut best = self.vectors.score(ep as usize, query);
        loop {
            let mut improved = false;
            for &n in &self.levels[level][ep as usize] {
                let s = self.vectors.score(n as usize, query);
                if s > best || (s == best && n < ep) {
                    best = s;
                    ep = n;
                    improved = true;
                }
            }
            if !improved {
                return ep;
            }
        }
    }

    /// Beam search at one level. Returns up to `ef` rows sorted by score
    /// descending (row id ascending on ties).
    fn search_layer(&mut self, query: &[f32], ep: u32, ef: usize, level: usize) -> Vec<Scored> {
        self.visited.clear();
        self.visited.visit(ep as usize);

        let entry = Scored {
            score: self.vectors.score(ep as usize, query),
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

            let neighbors = self.levels[level][current.row as usize].clone();
            for n in neighbors {
                if self.visited.is_visited(n as usize) {
                    continue;
                }
                self.visited.visit(n as usize);

                let scored = Scored {
                    score: self.vectors.score(n as usize, query),
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
        out
    }

    /// Diversity-preserving neighbor selection.
    ///
    /// A candidate is kept only while it is closer to the query than to any
    /// already-kept neighbor; a kept neighbor that is closer "covers" that
    /// direction. Remaining slots are filled with the closest skipped
    /// candidates so sparse regions still reach the budget.
    fn select_neighbors(&self, candidates: &[Scored], budget: usize) -> Vec<Scored> {
        let mut selected: Vec<Scored> = Vec::with_capacity(budget);
        let mut skipped: Vec<Scored> = Vec::new();

        for &candidate in candidates {
            if selected.len() >= budget {
                break;
            }
            let c_vec = self.vectors.row(candidate.row as usize);
            let covered = selected.iter().any(|s| {
                let to_selected = self.vectors.score(s.row as usize, c_vec);
                to_selected > candidate.score
            });
            if covered {
                skipped.push(candidate);
            } else {
                selected.push(candidate);
            }
        }

        for candidate in skipped {
            if selected.len() >= budget {
                break;
            }
            selected.push(candidate);
        }

        selected
    }

    fn add_edge(&mut self, level: usize, a: u32, b: u32) {
        if a == b {
            return;
        }
        let list_a = &mut self.levels[level][a as usize];
        if !list_a.contains(&b) {
            list_a.push(b);
        }
        let list_b = &mut self.levels[level][b as usize];
        if !list_b.contains(&a) {
            list_b.push(a);
        }
    }

    /// Trims `node`'s list back to budget, dropping the reverse edge of
    /// every removed link so symmetry holds.
    fn prune(&mut self, level: usize, node: u32) {
        let budget = self.budget(level);
        if self.levels[level][node as usize].len() <= budget {
            return;
        }

        let node_vec = self.vectors.row(node as usize).to_vec();
        let mut scored: Vec<Scored> = self.levels[level][node as usize]
            .iter()
            .map(|&n| Scored {
                score: self.vectors.score(n as usize, &node_vec),
                row: n,
            })
            .collect();
        scored.sort_unstable_by(|a, b| b.cmp(a));

        let keep = self.select_neighbors(&scored, budget);
        let kept: Vec<u32> = keep.iter().map(|s| s.row).collect();

        for dropped in self.levels[level][node as usize].clone() {
            if !kept.contains(&dropped) {
                self.levels[level][dropped as usize].retain(|&n| n != node);
            }
        }
        self.levels[level][node as usize] = kept;
    }
}

/// A finished graph in adjacency-list form, ready for serialization.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    /// `levels[l][row]` = neighbors of `row` at level `l`
    pub levels: Vec<Vec<Vec<u32>>>,
    /// Entry row, or `-1` when the graph is empty
    pub entry_point: i64,
    /// Highest level
    pub max_level: usize,
    /// Edge budget parameter
    pub m: usize,
    /// Construction beam width
    pub ef_construction: usize,
    /// Row count the graph was built over
    pub rows: usize,
}

impl BuiltGraph {
    /// Converts the adjacency lists to per-level CSR form.
    pub fn to_csr(&self) -> CsrGraph {
        let levels = self
            .levels
            .iter()
            .map(|level| {
                let mut indptr = Vec::with_capacity(self.rows + 1);
                let mut indices = Vec::new();
                indptr.push(0u32);
                for row in 0..self.rows {
                    indices.extend_from_slice(&level[row]);
                    indptr.push(indices.len() as u32);
                }
                CsrLevel { indptr, indices }
            })
            .collect();

        CsrGraph {
            levels,
            entry_point: self.entry_point.max(0) as u32,
            max_level: self.max_level,
            m: self.m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::search::brute_force_search;
    use std::collections::HashSet;

    fn random_unit_vectors(n: usize, dims: usize, seed: u64) -> VectorStore {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut store = VectorStore::new(dims);
        for _ in 0..n {
            let mut v: Vec<f32> = (0..dims).map(|_| rng.gen::<f32>() - 0.5).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            for x in v.iter_mut() {
                *x /= norm;
            }
            store.push(&v);
        }
        store
    }

    #[test]
    fn test_empty_input_has_no_entry_point() {
        let store = VectorStore::new(8);
        let graph = HnswBuilder::build(&store, HnswParams::default());
        assert_eq!(graph.entry_point, -1);
        assert_eq!(graph.rows, 0);
    }

    #[test]
    fn test_single_row_graph() {
        let mut store = VectorStore::new(4);
        store.push(&[1.0, 0.0, 0.0, 0.0]);
        let graph = HnswBuilder::build(&store, HnswParams::default());
        assert_eq!(graph.entry_point, 0);
        assert!(graph.levels[0][0].is_empty());
    }

    #[test]
    fn test_edges_are_symmetric_deduplicated_and_loop_free() {
        let store = random_unit_vectors(300, 16, 7);
        let graph = HnswBuilder::build(
            &store,
            HnswParams {
                m: 8,
                ef_construction: 60,
                seed: 7,
            },
        );

        for (level, adjacency) in graph.levels.iter().enumerate() {
            for (row, neighbors) in adjacency.iter().enumerate() {
                let unique: HashSet<&u32> = neighbors.iter().collect();
                assert_eq!(unique.len(), neighbors.len(), "dup at level {level}");
                assert!(
                    !neighbors.contains(&(row as u32)),
                    "self-loop at level {level} row {row}"
                );
                for &n in neighbors {
                    assert!(
                        adjacency[n as usize].contains(&(row as u32)),
                        "asymmetric edge {row}->{n} at level {level}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_edge_budget_is_respected() {
        let store = random_unit_vectors(400, 16, 3);
        let params = HnswParams {
            m: 6,
            ef_construction: 50,
            seed: 3,
        };
        let graph = HnswBuilder::build(&store, params.clone());

        for (level, adjacency) in graph.levels.iter().enumerate() {
            let budget = if level == 0 { params.m * 2 } else { params.m };
            for (row, neighbors) in adjacency.iter().enumerate() {
                assert!(
                    neighbors.len() <= budget,
                    "row {row} has {} edges at level {level}, budget {budget}",
                    neighbors.len()
                );
            }
        }
    }

    #[test]
    fn test_csr_conversion_is_valid() {
        let store = random_unit_vectors(200, 8, 11);
        let graph = HnswBuilder::build(&store, HnswParams::default());
        let csr = graph.to_csr();
        csr.validate(200).unwrap();

        // Spot-check a row against the adjacency form.
        assert_eq!(csr.neighbors(0, 5), graph.levels[0][5].as_slice());
    }

    #[test]
    fn test_same_seed_builds_identical_graphs() {
        let store = random_unit_vectors(150, 8, 42);
        let params = HnswParams {
            m: 8,
            ef_construction: 80,
            seed: 42,
        };
        let a = HnswBuilder::build(&store, params.clone());
        let b = HnswBuilder::build(&store, params);
        assert_eq!(a.entry_point, b.entry_point);
        assert_eq!(a.levels, b.levels);
    }

    #[test]
    fn test_recall_against_brute_force_oracle() {
        let store = random_unit_vectors(600, 24, 5);
        let graph = HnswBuilder::build(
            &store,
            HnswParams {
                m: 16,
                ef_construction: 200,
                seed: 5,
            },
        )
        .to_csr();

        let k = 10;
        let mut rng = StdRng::seed_from_u64(99);
        let mut total_recall = 0.0f64;
        let queries = 100;

        for _ in 0..queries {
            let mut q: Vec<f32> = (0..24).map(|_| rng.gen::<f32>() - 0.5).collect();
            let norm = q.iter().map(|x| x * x).sum::<f32>().sqrt();
            for x in q.iter_mut() {
                *x /= norm;
            }

            let truth: HashSet<u32> = brute_force_search(&store, &q, k)
                .into_iter()
                .map(|(row, _)| row)
                .collect();
            let found: HashSet<u32> =
                crate::hnsw::search::hnsw_search(&store, &graph, &q, k, &Default::default())
                    .into_iter()
                    .map(|(row, _)| row)
                    .collect();

            total_recall += truth.intersection(&found).count() as f64 / k as f64;
        }

        let mean_recall = total_recall / queries as f64;
        assert!(
            mean_recall >= 0.9,
            "mean recall@{k} was {mean_recall:.3}, expected >= 0.9"
        );
    }
}
