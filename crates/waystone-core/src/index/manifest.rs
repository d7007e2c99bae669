//! Manifest wire format.
//!
//! The manifest is the single JSON document describing every byte of the
//! on-disk index: vector shard geometry and hashes, the row→slug id map,
//! chunk→document metadata, and the HNSW graph descriptor. Field names are
//! camelCase on the wire; the schema is stable across build and query.

use crate::error::AssetError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root metadata object for a built index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version
    pub version: u32,
    /// Embedding dimension
    pub dims: usize,
    /// Vector element type; only `"fp32"` is supported
    pub dtype: String,
    /// Whether rows are L2-normalized
    pub normalized: bool,
    /// Total vector rows across all shards
    pub rows: usize,
    /// Rows per shard (the last shard may be shorter)
    pub shard_size_rows: usize,
    /// Vector shard listing
    pub vectors: VectorsMeta,
    /// Row index → chunk slug, in row order
    pub ids: Vec<String>,
    /// Optional row index → display title, parallel to `ids`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titles: Option<Vec<String>>,
    /// Optional chunk slug → parent document mapping.
    ///
    /// A slug absent from this map is its own document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_metadata: Option<HashMap<String, ChunkRef>>,
    /// HNSW graph descriptor
    pub hnsw: HnswMeta,
}

/// Vector storage description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorsMeta {
    /// Element dtype, mirrors the root `dtype`
    pub dtype: String,
    /// Total rows
    pub rows: usize,
    /// Vector dimension
    pub dims: usize,
    /// Shards in `rowOffset` order, tiling `[0, rows)`
    pub shards: Vec<ShardMeta>,
}

/// One vector shard file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardMeta {
    /// Fetch path, relative to the index base URL
    pub path: String,
    /// Rows in this shard
    pub rows: usize,
    /// First row index covered by this shard
    pub row_offset: usize,
    /// Payload length in bytes (`rows * dims * 4`)
    pub byte_length: usize,
    /// Bytes per row (`dims * 4`)
    pub byte_stride: usize,
    /// SHA-256 of the payload, lowercase hex
    pub sha256: String,
}

/// Parent linkage for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRef {
    /// Slug of the document this chunk was cut from
    pub parent_slug: String,
    /// 0-based position of the chunk within its parent
    pub chunk_id: usize,
}

/// HNSW parameters and graph blob descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswMeta {
    /// Edge budget per node per level (level 0 uses `2 * M`)
    #[serde(rename = "M")]
    pub m: usize,
    /// Construction beam width
    pub ef_construction: usize,
    /// Entry row for search; `-1` means the graph is unusable and search
    /// falls back to brute force
    pub entry_point: i64,
    /// Highest level in the graph
    pub max_level: usize,
    /// Graph blob location and layout
    pub graph: GraphMeta,
}

/// Graph blob file plus per-level section offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMeta {
    /// Fetch path, relative to the index base URL
    pub path: String,
    /// SHA-256 of the whole blob, lowercase hex
    pub sha256: String,
    /// Per-level CSR sections in ascending level order
    pub levels: Vec<LevelMeta>,
}

/// CSR sections for one level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelMeta {
    /// Level number
    pub level: usize,
    /// `indptr` section (uint32 LE, `rows + 1` elements)
    pub indptr: SectionMeta,
    /// `indices` section (uint32 LE)
    pub indices: SectionMeta,
}

/// A typed byte range inside the graph blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMeta {
    /// Absolute byte offset into the blob
    pub offset: usize,
    /// Number of uint32 elements
    pub elements: usize,
    /// Section length in bytes (`elements * 4`)
    pub byte_length: usize,
}

impl Manifest {
    /// Structural validation of everything that can be checked without the
    /// binary payloads.
    ///
    /// Checks the dtype, the id map length, shard tiling (sorted by
    /// `rowOffset`, no gaps or overlaps, byte lengths consistent with the
    /// geometry), and the entry point bounds.
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.dtype != "fp32" || self.vectors.dtype != "fp32" {
            return Err(AssetError::InvalidManifest(format!(
                "unsupported dtype {:?}",
                self.dtype
            )));
        }
        if self.dims == 0 {
            return Err(AssetError::InvalidManifest("dims is zero".to_string()));
        }
        if self.ids.len() != self.rows {
            return Err(AssetError::InvalidManifest(format!(
                "ids has {} entries for {} rows",
                self.ids.len(),
                self.rows
            )));
        }
        if let Some(titles) = &self.titles {
            if titles.len() != self.rows {
                return Err(AssetError::InvalidManifest(format!(
                    "titles has {} entries for {} rows",
                    titles.len(),
                    self.rows
                )));
            }
        }

        let mut covered = 0usize;
        for shard in &self.vectors.shards {
            if shard.row_offset != covered {
                return Err(AssetError::InvalidManifest(format!(
                    "shard {} starts at row {} but {} rows are covered",
                    shard.path, shard.row_offset, covered
                )));
            }
            if shard.byte_length != shard.rows * self.dims * 4 {
                return Err(AssetError::InvalidManifest(format!(
                    "shard {} is {} bytes for {} rows of {} dims",
                    shard.path, shard.byte_length, shard.rows, self.dims
                )));
            }
            covered += shard.rows;
        }
        if covered != self.rows {
            return Err(AssetError::InvalidManifest(format!(
                "shards cover {} of {} rows",
                covered, self.rows
            )));
        }

        if self.hnsw.entry_point >= 0 {
            if self.hnsw.entry_point as usize >= self.rows {
                return Err(AssetError::InvalidManifest(format!(
                    "entry point {} out of bounds for {} rows",
                    self.hnsw.entry_point, self.rows
                )));
            }
            if self.hnsw.graph.levels.len() != self.hnsw.max_level + 1 {
                return Err(AssetError::InvalidManifest(format!(
                    "{} level descriptors for maxLevel {}",
                    self.hnsw.graph.levels.len(),
                    self.hnsw.max_level
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(path: &str, rows: usize, row_offset: usize, dims: usize) -> ShardMeta {
        ShardMeta {
            path: path.to_string(),
            rows,
            row_offset,
            byte_length: rows * dims * 4,
            byte_stride: dims * 4,
            sha256: "00".repeat(32),
        }
    }

    fn manifest(rows: usize, dims: usize, shards: Vec<ShardMeta>) -> Manifest {
        Manifest {
            version: 2,
            dims,
            dtype: "fp32".to_string(),
            normalized: true,
            rows,
            shard_size_rows: 1024,
            vectors: VectorsMeta {
                dtype: "fp32".to_string(),
                rows,
                dims,
                shards,
            },
            ids: (0..rows).map(|i| format!("doc-{i}")).collect(),
            titles: None,
            chunk_metadata: None,
            hnsw: HnswMeta {
                m: 16,
                ef_construction: 200,
                entry_point: -1,
                max_level: 0,
                graph: GraphMeta {
                    path: "/embeddings/hnsw.bin".to_string(),
                    sha256: "00".repeat(32),
                    levels: vec![],
                },
            },
        }
    }

    #[test]
    fn test_valid_manifest_passes() {
        let m = manifest(10, 4, vec![shard("a", 6, 0, 4), shard("b", 4, 6, 4)]);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_fp32() {
        let mut m = manifest(4, 4, vec![shard("a", 4, 0, 4)]);
        m.dtype = "fp16".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_rejects_shard_gap() {
        let m = manifest(10, 4, vec![shard("a", 5, 0, 4), shard("b", 4, 6, 4)]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_rejects_shard_overlap() {
        let m = manifest(10, 4, vec![shard("a", 6, 0, 4), shard("b", 5, 5, 4)]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_rejects_partial_coverage() {
        let m = manifest(10, 4, vec![shard("a", 6, 0, 4)]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_byte_length() {
        let mut s = shard("a", 4, 0, 4);
        s.byte_length -= 1;
        let m = manifest(4, 4, vec![s]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_rejects_entry_point_out_of_bounds() {
        let mut m = manifest(4, 4, vec![shard("a", 4, 0, 4)]);
        m.hnsw.entry_point = 4;
        m.hnsw.graph.levels = vec![];
        m.hnsw.max_level = 0;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_rejects_id_count_mismatch() {
        let mut m = manifest(4, 4, vec![shard("a", 4, 0, 4)]);
        m.ids.pop();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let m = manifest(1, 4, vec![shard("a", 1, 0, 4)]);
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("shardSizeRows").is_some());
        assert!(json["vectors"]["shards"][0].get("rowOffset").is_some());
        assert!(json["vectors"]["shards"][0].get("byteStride").is_some());
        assert!(json["hnsw"].get("M").is_some());
        assert!(json["hnsw"].get("efConstruction").is_some());
        assert!(json["hnsw"].get("entryPoint").is_some());
        // Optional maps stay off the wire when absent.
        assert!(json.get("chunkMetadata").is_none());
    }

    #[test]
    fn test_chunk_metadata_round_trip() {
        let mut m = manifest(1, 4, vec![shard("a", 1, 0, 4)]);
        let mut meta = HashMap::new();
        meta.insert(
            "notes/cats#chunk1".to_string(),
            ChunkRef {
                parent_slug: "notes/cats".to_string(),
                chunk_id: 1,
            },
        );
        m.chunk_metadata = Some(meta);

        let json = serde_json::to_string(&m).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        let re = back.chunk_metadata.unwrap();
        assert_eq!(re["notes/cats#chunk1"].parent_slug, "notes/cats");
        assert_eq!(re["notes/cats#chunk1"].chunk_id, 1);
    }
}
