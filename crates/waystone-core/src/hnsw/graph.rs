//! CSR adjacency views over the serialized graph blob.
//!
//! The graph blob concatenates one section pair per level in ascending
//! level order: `indptr` (uint32 LE, `rows + 1` elements) then `indices`
//! (uint32 LE). Every level's `indptr` spans all rows; rows absent from a
//! level simply have an empty neighbor range, so readers index levels
//! directly by row id.

use crate::error::AssetError;
use crate::index::manifest::LevelMeta;

/// Adjacency for one level in compressed sparse row form.
#[derive(Debug, Clone)]
pub struct CsrLevel {
    /// Offsets into `indices`; `indptr[row]..indptr[row + 1]` is the
    /// neighbor range of `row`
    pub indptr: Vec<u32>,
    /// Concatenated neighbor lists
    pub indices: Vec<u32>,
}

impl CsrLevel {
    /// Neighbor list of `row` at this level.
    #[inline]
    pub fn neighbors(&self, row: u32) -> &[u32] {
        let start = self.indptr[row as usize] as usize;
        let end = self.indptr[row as usize + 1] as usize;
        &self.indices[start..end]
    }
}

/// The full layered graph.
#[derive(Debug, Clone)]
pub struct CsrGraph {
    /// Levels in ascending order; `levels[0]` is the base layer
    pub levels: Vec<CsrLevel>,
    /// Row the search descends from
    pub entry_point: u32,
    /// Highest level (`levels.len() - 1`)
    pub max_level: usize,
    /// Edge budget parameter the graph was built with
    pub m: usize,
}

impl CsrGraph {
    /// Neighbor list of `row` at `level`.
    #[inline]
    pub fn neighbors(&self, level: usize, row: u32) -> &[u32] {
        self.levels[level].neighbors(row)
    }

    /// Reconstructs per-level CSR views from the blob.
    ///
    /// Section offsets come from the manifest and are absolute byte
    /// offsets into `blob`.
    pub fn from_blob(
        blob: &[u8],
        levels: &[LevelMeta],
        rows: usize,
        entry_point: u32,
        m: usize,
    ) -> Result<Self, AssetError> {
        let mut out = Vec::with_capacity(levels.len());
        for meta in levels {
            let indptr = read_u32_section(blob, meta.indptr.offset, meta.indptr.elements)?;
            if indptr.len() != rows + 1 {
                return Err(AssetError::InvalidGraph(format!(
                    "level {}: indptr has {} elements for {} rows",
                    meta.level,
                    indptr.len(),
                    rows
                )));
            }
            let indices = read_u32_section(blob, meta.indices.offset, meta.indices.elements)?;
            out.push(CsrLevel { indptr, indices });
        }

        let graph = Self {
            levels: out,
            entry_point,
            max_level: levels.len().saturating_sub(1),
            m,
        };
        graph.validate(rows)?;
        Ok(graph)
    }

    /// Checks the structural invariants of the decoded graph.
    ///
    /// `indptr` must be monotone non-decreasing and end at the indices
    /// length, every neighbor id must be a valid row, and the entry point
    /// must exist at every level.
    pub fn validate(&self, rows: usize) -> Result<(), AssetError> {
        if self.entry_point as usize >= rows {
            return Err(AssetError::InvalidGraph(format!(
                "entry point {} out of bounds",
                self.entry_point
            )));
        }
        for (level, csr) in self.levels.iter().enumerate() {
            for pair in csr.indptr.windows(2) {
                if pair[1] < pair[0] {
                    return Err(AssetError::InvalidGraph(format!(
                        "level {level}: indptr not monotone"
                    )));
                }
            }
            if *csr.indptr.last().unwrap_or(&0) as usize != csr.indices.len() {
                return Err(AssetError::InvalidGraph(format!(
                    "level {level}: indptr end does not match indices length"
                )));
            }
            if let Some(&max) = csr.indices.iter().max() {
                if max as usize >= rows {
                    return Err(AssetError::InvalidGraph(format!(
                        "level {level}: neighbor {max} out of bounds"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn read_u32_section(blob: &[u8], offset: usize, elements: usize) -> Result<Vec<u32>, AssetError> {
    let byte_len = elements * 4;
    let end = offset
        .checked_add(byte_len)
        .filter(|&e| e <= blob.len())
        .ok_or_else(|| {
            AssetError::InvalidGraph(format!(
                "section [{offset}, +{byte_len}) exceeds blob of {} bytes",
                blob.len()
            ))
        })?;
    Ok(blob[offset..end]
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
