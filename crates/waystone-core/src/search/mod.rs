//! Hybrid retrieval: aggregation, fusion, and the interactive session.
//!
//! The semantic path returns chunk-level hits; [`aggregation`] lifts them
//! to documents with per-document reciprocal rank fusion. [`fusion`]
//! combines that ranking with the lexical field union under mode-dependent
//! weights. [`session`] owns the interactive loop: debouncing, sequence
//! tokens, supersession, and graceful degradation when the semantic path
//! dies.

pub mod aggregation;
pub mod fusion;
pub mod session;
pub mod types;

pub use aggregation::{aggregate_by_document, score_to_percent, DocSemantic};
pub use fusion::{fuse, rank_lexical_union, FusionWeights, LexicalCandidate, SearchMode};
pub use session::{
    classify_edit, debounce_delay, EditKind, RenderEvent, RenderPhase, SearchSession,
    MODE_STORE_KEY,
};
pub use types::{DocumentRecord, FusedResult, SemanticHit};
