//! Index artifact writer.
//!
//! Writes vector shards and the graph blob with SHA-256 content hashes,
//! then the manifest last. Paths recorded in the manifest use a public
//! prefix (the URL path the site serves the directory under) rather than
//! the local output directory.

use super::manifest::{
    GraphMeta, HnswMeta, LevelMeta, Manifest, SectionMeta, ShardMeta, VectorsMeta,
};
use crate::config::MANIFEST_VERSION;
use crate::error::BuildError;
use crate::hnsw::builder::BuiltGraph;
use crate::hnsw::VectorStore;
use crate::index::ChunkRef;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Graph blob file name inside the output directory.
const GRAPH_FILENAME: &str = "hnsw.bin";

/// Manifest file name inside the output directory.
const MANIFEST_FILENAME: &str = "manifest.json";

/// Writes the three index artifacts into an output directory.
pub struct IndexWriter {
    out_dir: PathBuf,
    public_prefix: String,
}

impl IndexWriter {
    /// Creates a writer targeting `out_dir`; manifest paths are prefixed
    /// with `public_prefix` (e.g. `/embeddings`).
    pub fn new<P: AsRef<Path>>(out_dir: P, public_prefix: &str) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Writes vector shards of `shard_rows` rows each (the last may be
    /// shorter) and returns their manifest entries in row-offset order.
    pub fn write_shards(
        &self,
        vectors: &VectorStore,
        shard_rows: usize,
    ) -> Result<Vec<ShardMeta>, BuildError> {
        self.ensure_out_dir()?;

        let dims = vectors.dims();
        let rows = vectors.rows();
        let shard_rows = shard_rows.max(1);
        let mut shards = Vec::new();
        let mut row_offset = 0usize;
        let mut shard_index = 0usize;

        while row_offset < rows {
            let end = (row_offset + shard_rows).min(rows);
            let slice = &vectors.as_slice()[row_offset * dims..end * dims];

            let mut payload = Vec::with_capacity(slice.len() * 4);
            for value in slice {
                payload.extend_from_slice(&value.to_le_bytes());
            }

            let digest = format!("{:x}", Sha256::digest(&payload));
            let file_name = format!("vectors-{shard_index:03}.bin");
            let path = self.out_dir.join(&file_name);
            fs::write(&path, &payload).map_err(|e| BuildError::Write {
                path: path.display().to_string(),
                source: e,
            })?;

            shards.push(ShardMeta {
                path: format!("{}/{}", self.public_prefix, file_name),
                rows: end - row_offset,
                row_offset,
                byte_length: payload.len(),
                byte_stride: dims * 4,
                sha256: digest,
            });

            row_offset = end;
            shard_index += 1;
        }

        info!(shards = shards.len(), rows, "wrote vector shards");
        Ok(shards)
    }

    /// Writes the graph blob and returns its manifest descriptor.
    ///
    /// Layout: for each level in ascending order, `indptr` then `indices`,
    /// both uint32 LE. Every level's `indptr` has `rows + 1` elements so
    /// readers index by row id directly. Offsets recorded are absolute
    /// byte offsets into the file.
    pub fn write_graph(&self, graph: &BuiltGraph) -> Result<GraphMeta, BuildError> {
        self.ensure_out_dir()?;

        let csr = graph.to_csr();
        let mut blob: Vec<u8> = Vec::new();
        let mut levels = Vec::with_capacity(csr.levels.len());

        for (level, section) in csr.levels.iter().enumerate() {
            let indptr_offset = blob.len();
            for v in &section.indptr {
                blob.extend_from_slice(&v.to_le_bytes());
            }
            let indices_offset = blob.len();
            for v in &section.indices {
                blob.extend_from_slice(&v.to_le_bytes());
            }

            levels.push(LevelMeta {
                level,
                indptr: SectionMeta {
                    offset: indptr_offset,
                    elements: section.indptr.len(),
                    byte_length: section.indptr.len() * 4,
                },
                indices: SectionMeta {
                    offset: indices_offset,
                    elements: section.indices.len(),
                    byte_length: section.indices.len() * 4,
                },
            });
        }

        let digest = format!("{:x}", Sha256::digest(&blob));
        let path = self.out_dir.join(GRAPH_FILENAME);
        fs::write(&path, &blob).map_err(|e| BuildError::Write {
            path: path.display().to_string(),
            source: e,
        })?;

        info!(
            levels = levels.len(),
            bytes = blob.len(),
            "wrote hnsw graph blob"
        );

        Ok(GraphMeta {
            path: format!("{}/{}", self.public_prefix, GRAPH_FILENAME),
            sha256: digest,
            levels,
        })
    }

    /// Assembles the manifest from written artifacts.
    #[allow(clippy::too_many_arguments)]
    pub fn build_manifest(
        &self,
        dims: usize,
        shard_size_rows: usize,
        shards: Vec<ShardMeta>,
        ids: Vec<String>,
        titles: Vec<String>,
        chunk_metadata: HashMap<String, ChunkRef>,
        graph: &BuiltGraph,
        graph_meta: GraphMeta,
    ) -> Manifest {
        let rows = ids.len();
        Manifest {
            version: MANIFEST_VERSION,
            dims,
            dtype: "fp32".to_string(),
            normalized: true,
            rows,
            shard_size_rows,
            vectors: VectorsMeta {
                dtype: "fp32".to_string(),
                rows,
                dims,
                shards,
            },
            ids,
            titles: Some(titles),
            chunk_metadata: Some(chunk_metadata),
            hnsw: HnswMeta {
                m: graph.m,
                ef_construction: graph.ef_construction,
                entry_point: graph.entry_point,
                max_level: graph.max_level,
                graph: graph_meta,
            },
        }
    }

    /// Writes the manifest. This is the final step of a build: a readable
    /// manifest implies every other artifact is already in place.
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<(), BuildError> {
        self.ensure_out_dir()?;
        let path = self.out_dir.join(MANIFEST_FILENAME);
        let json = serde_json::to_string(manifest).expect("manifest serialization is infallible");
        fs::write(&path, json).map_err(|e| BuildError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        info!(path = %path.display(), rows = manifest.rows, "wrote manifest");
        Ok(())
    }

    fn ensure_out_dir(&self) -> Result<(), BuildError> {
        fs::create_dir_all(&self.out_dir).map_err(|e| BuildError::Write {
            path: self.out_dir.display().to_string(),
            source: e,
        })
    }
}
