//! Approximate nearest-neighbor search over L2-normalized vectors.
//!
//! A from-scratch HNSW (Malkov & Yashunin, arXiv:1603.09320) specialised
//! for a read-only index: [`builder`] constructs the layered graph offline,
//! [`graph`] holds the per-level CSR adjacency views reconstructed from a
//! single binary blob, and [`search`] walks them at query time. Similarity
//! is the dot product, which equals cosine on unit vectors.
//!
//! The hot path touches only contiguous primitive arrays: one `f32` buffer
//! for all vectors and two `u32` arrays per level for the adjacency.

pub mod builder;
pub mod graph;
pub mod search;
mod visited;

pub use builder::{HnswBuilder, HnswParams};
pub use graph::{CsrGraph, CsrLevel};
pub use search::{brute_force_search, hnsw_search, SearchParams};

/// Dense row-major fp32 vector storage.
///
/// All rows share one contiguous buffer so the search loop runs over plain
/// slices with no per-row indirection.
#[derive(Debug, Clone)]
pub struct VectorStore {
    data: Vec<f32>,
    dims: usize,
}

impl VectorStore {
    /// Creates an empty store for vectors of `dims` components.
    pub fn new(dims: usize) -> Self {
        Self {
            data: Vec::new(),
            dims,
        }
    }

    /// Creates a store backed by an existing row-major buffer.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` is not a multiple of `dims`.
    pub fn from_raw(data: Vec<f32>, dims: usize) -> Self {
        assert!(dims > 0 && data.len() % dims == 0, "ragged vector buffer");
        Self { data, dims }
    }

    /// Appends one row.
    ///
    /// # Panics
    ///
    /// Panics if `row.len() != dims`.
    pub fn push(&mut self, row: &[f32]) {
        assert_eq!(row.len(), self.dims, "row dimension mismatch");
        self.data.extend_from_slice(row);
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    /// Vector dimension.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Borrow row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.dims;
        &self.data[start..start + self.dims]
    }

    /// The whole backing buffer, row-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Dot product of row `i` against `query`.
    #[inline]
    pub fn score(&self, i: usize, query: &[f32]) -> f32 {
        dot(self.row(i), query)
    }
}

/// Plain dot product.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_store_rows() {
        let mut store = VectorStore::new(3);
        assert_eq!(store.rows(), 0);
        store.push(&[1.0, 0.0, 0.0]);
        store.push(&[0.0, 1.0, 0.0]);
        assert_eq!(store.rows(), 2);
        assert_eq!(store.row(1), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_score_is_dot_product() {
        let mut store = VectorStore::new(3);
        store.push(&[0.5, 0.5, 0.0]);
        assert!((store.score(0, &[1.0, 0.0, 0.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "row dimension mismatch")]
    fn test_push_rejects_wrong_dims() {
        let mut store = VectorStore::new(3);
        store.push(&[1.0, 2.0]);
    }
}
