//! Production configuration constants.
//!
//! Values shared between the build pipeline and the query engine. Keeping
//! them in one module means the CLIs, the worker, and the benchmarks agree
//! on defaults.

// =============================================================================
// Chunking
// =============================================================================

/// Default chunk window in characters.
///
/// Roughly 512 tokens at ~4 characters per token for English prose, which
/// keeps a chunk inside the sequence budget of the embedding models we
/// target.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Default overlap between adjacent chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 512;

/// How far a chunk boundary may move to land on whitespace, as a fraction
/// of the chunk window.
pub const CHUNK_SNAP_TOLERANCE: f32 = 0.1;

// =============================================================================
// Index layout
// =============================================================================

/// Default rows per vector shard.
pub const DEFAULT_SHARD_SIZE_ROWS: usize = 1024;

/// Manifest schema version emitted by the writer.
pub const MANIFEST_VERSION: u32 = 2;

// =============================================================================
// HNSW
// =============================================================================

/// Edge budget per node per level (M). Level 0 uses `2 * M`.
///
/// 16 is the balanced recommendation from Malkov & Yashunin (2018),
/// arXiv:1603.09320.
pub const HNSW_M: usize = 16;

/// Beam width during graph construction.
pub const HNSW_EF_CONSTRUCTION: usize = 200;

/// Lower bound on the query-time beam width.
pub const EF_SEARCH_FLOOR: usize = 64;

/// Query-time beam width also scales with the graph parameter: `4 * M`.
pub const EF_SEARCH_M_MULTIPLIER: usize = 4;

/// Query-time beam width scales with the requested result count: `10 * k`.
pub const EF_SEARCH_K_MULTIPLIER: usize = 10;

// =============================================================================
// Fusion
// =============================================================================

/// RRF rank constant from Cormack, Clarke & Buettcher (SIGIR 2009).
pub const RRF_K: f32 = 60.0;

/// Multiplier applied to documents whose title shares a token with the query.
pub const TITLE_BOOST: f32 = 1.5;

/// Weight of the user's active retrieval mode.
pub const FUSION_PRIMARY_WEIGHT: f32 = 1.0;

/// Weight of the secondary ranker when both are available.
pub const FUSION_SECONDARY_WEIGHT: f32 = 0.3;

/// Number of documents surfaced per query.
pub const RESULT_LIMIT: usize = 10;

/// Chunk hits requested from the semantic path per query.
///
/// Over-fetched relative to [`RESULT_LIMIT`] so that document aggregation
/// still has enough distinct parents after grouping.
pub const SEMANTIC_CHUNK_K: usize = 10;

// =============================================================================
// Query scheduling (milliseconds)
// =============================================================================

/// Debounce when the user extends the previous term past 2 characters.
pub const DEBOUNCE_EXTENSION_MS: u64 = 200;

/// Extra delay for extensions while semantic mode is active.
pub const DEBOUNCE_EXTENSION_SEMANTIC_SURCHARGE_MS: u64 = 60;

/// Debounce when the term is replaced wholesale past 3 characters.
pub const DEBOUNCE_REPLACEMENT_MS: u64 = 120;

/// Debounce when the user deletes characters.
pub const DEBOUNCE_RETRACTION_MS: u64 = 90;

/// Debounce for everything else.
pub const DEBOUNCE_DEFAULT_MS: u64 = 200;

/// Extra default delay while semantic mode is active.
pub const DEBOUNCE_DEFAULT_SEMANTIC_SURCHARGE_MS: u64 = 40;

// =============================================================================
// Remote embedding
// =============================================================================

/// Attempts per batch before a transient failure becomes fatal.
pub const EMBED_MAX_ATTEMPTS: usize = 3;

/// Base backoff between retries; doubles per attempt.
pub const EMBED_BACKOFF_BASE_MS: u64 = 500;

/// Default texts per remote embedding request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Default in-flight remote embedding requests.
pub const DEFAULT_EMBED_CONCURRENCY: usize = 8;

// =============================================================================
// Lexical index
// =============================================================================

/// Candidate documents returned per field per query.
pub const LEXICAL_FIELD_LIMIT: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_overlap_smaller_than_window() {
        assert!(DEFAULT_CHUNK_OVERLAP < DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_ef_floor_covers_default_m() {
        // With the default M the 4*M term should dominate the floor.
        assert!(EF_SEARCH_M_MULTIPLIER * HNSW_M >= EF_SEARCH_FLOOR);
    }
}
