//! On-disk index interchange format.
//!
//! The build pipeline and the query engine meet at three artifacts: raw
//! little-endian fp32 vector shards, a single binary HNSW graph blob in
//! per-level CSR sections, and a JSON [`Manifest`](manifest::Manifest)
//! describing every byte of both. The manifest is written last so its
//! presence signals a complete build.

pub mod manifest;
pub mod writer;

pub use manifest::{ChunkRef, GraphMeta, HnswMeta, LevelMeta, Manifest, SectionMeta, ShardMeta,
    VectorsMeta};
pub use writer::IndexWriter;
