//! The offline index build pipeline.
//!
//! Orchestrates corpus → chunks → embeddings → shards + graph + manifest.
//! Chunk emission order fixes row order for everything downstream; the
//! manifest is written last so its presence signals a complete build.

use crate::chunking::{chunk_text, ChunkerConfig};
use crate::embedding::EmbedDriver;
use crate::error::BuildError;
use crate::hnsw::{HnswBuilder, HnswParams, VectorStore};
use crate::index::{ChunkRef, IndexWriter};
use crate::search::types::DocumentRecord;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use tracing::info;

/// Build-time configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Chunk window/overlap settings
    pub chunker: ChunkerConfig,
    /// Vector dimension written to the index
    pub dims: usize,
    /// Rows per vector shard
    pub shard_size_rows: usize,
    /// Graph construction parameters
    pub hnsw: HnswParams,
    /// URL path prefix recorded in the manifest (e.g. `/embeddings`)
    pub public_prefix: String,
}

/// Counters reported after a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    /// Input documents
    pub documents: usize,
    /// Documents that were split into more than one chunk
    pub chunked_documents: usize,
    /// Total rows written (chunks embedded)
    pub rows: usize,
}

/// Loads a JSONL corpus: one [`DocumentRecord`] per non-blank line.
pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<DocumentRecord>, BuildError> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| BuildError::CorpusRead(format!("{}: {e}", path.as_ref().display())))?;
    let reader = std::io::BufReader::new(file);

    let mut docs = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| BuildError::CorpusRead(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: DocumentRecord = serde_json::from_str(&line)
            .map_err(|e| BuildError::CorpusRead(format!("line {}: {e}", line_no + 1)))?;
        docs.push(doc);
    }
    Ok(docs)
}

/// One chunk flattened into pipeline form.
struct ChunkRow {
    slug: String,
    title: String,
    text: String,
}

/// Runs the whole build and writes the artifacts into `out_dir`.
///
/// Returns the stats on success. An empty corpus is an error at the CLI
/// layer, not here; zero documents produce a valid (empty) index.
pub async fn build_index(
    docs: &[DocumentRecord],
    driver: &EmbedDriver,
    config: &BuildConfig,
    out_dir: &Path,
) -> Result<BuildStats, BuildError> {
    config.chunker.validate()?;

    // Chunk every document; row order is chunk emission order.
    let mut rows: Vec<ChunkRow> = Vec::new();
    let mut chunk_metadata: HashMap<String, ChunkRef> = HashMap::new();
    let mut chunked_documents = 0usize;

    for doc in docs {
        let chunks = chunk_text(&doc.text, &config.chunker);
        let title = if doc.title.is_empty() {
            doc.slug.clone()
        } else {
            doc.title.clone()
        };

        if chunks.len() <= 1 {
            // Unchunked documents keep their own slug and stay out of the
            // metadata map.
            let text = chunks
                .into_iter()
                .next()
                .map(|c| c.text)
                .unwrap_or_default();
            rows.push(ChunkRow {
                slug: doc.slug.clone(),
                title,
                text,
            });
            continue;
        }

        chunked_documents += 1;
        for chunk in chunks {
            let slug = format!("{}#chunk{}", doc.slug, chunk.index);
            chunk_metadata.insert(
                slug.clone(),
                ChunkRef {
                    parent_slug: doc.slug.clone(),
                    chunk_id: chunk.index,
                },
            );
            rows.push(ChunkRow {
                slug,
                title: title.clone(),
                text: chunk.text,
            });
        }
    }

    info!(
        documents = docs.len(),
        chunks = rows.len(),
        chunked_documents,
        "chunked corpus"
    );

    // Embed in passage form. The driver normalizes and coerces dims.
    let texts: Vec<String> = rows.iter().map(|r| r.text.clone()).collect();
    let vectors = driver.embed_passages(&texts).await?;

    let mut store = VectorStore::new(config.dims);
    for vector in &vectors {
        store.push(vector);
    }

    let graph = HnswBuilder::build(&store, config.hnsw.clone());

    let writer = IndexWriter::new(out_dir, &config.public_prefix);
    let shards = writer.write_shards(&store, config.shard_size_rows)?;
    let graph_meta = writer.write_graph(&graph)?;
    let manifest = writer.build_manifest(
        config.dims,
        config.shard_size_rows,
        shards,
        rows.iter().map(|r| r.slug.clone()).collect(),
        rows.iter().map(|r| r.title.clone()).collect(),
        chunk_metadata,
        &graph,
        graph_meta,
    );
    writer.write_manifest(&manifest)?;

    Ok(BuildStats {
        documents: docs.len(),
        chunked_documents,
        rows: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::Manifest;

    fn driver(dims: usize) -> EmbedDriver {
        EmbedDriver::new(Box::new(HashEmbedder::new(dims)), dims)
    }

    fn config(dims: usize) -> BuildConfig {
        BuildConfig {
            chunker: ChunkerConfig {
                size: 120,
                overlap: 30,
                disabled: false,
            },
            dims,
            shard_size_rows: 4,
            hnsw: HnswParams::default(),
            public_prefix: "/embeddings".to_string(),
        }
    }

    fn doc(slug: &str, title: &str, text: &str) -> DocumentRecord {
        DocumentRecord {
            slug: slug.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            tags: Vec::new(),
            aliases: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_build_produces_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let docs = vec![
            doc("a", "Alpha", "short body"),
            doc("b", "Beta", &"long body with many words ".repeat(30)),
        ];

        let stats = build_index(&docs, &driver(16), &config(16), dir.path())
            .await
            .unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunked_documents, 1);
        assert!(stats.rows > 2);

        let manifest: Manifest =
            serde_json::from_slice(&std::fs::read(dir.path().join("manifest.json")).unwrap())
                .unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest.rows, stats.rows);

        // Unchunked doc keeps its slug; chunked doc contributes
        // `#chunkN` slugs that all map back to it.
        assert!(manifest.ids.contains(&"a".to_string()));
        assert!(manifest.ids.iter().any(|id| id.starts_with("b#chunk")));
        let meta = manifest.chunk_metadata.unwrap();
        assert!(!meta.contains_key("a"));
        assert_eq!(meta["b#chunk0"].parent_slug, "b");
        assert_eq!(meta["b#chunk1"].chunk_id, 1);
    }

    #[tokio::test]
    async fn test_rows_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let docs = vec![doc("a", "Alpha", "one two three")];
        build_index(&docs, &driver(8), &config(8), dir.path())
            .await
            .unwrap();

        let bytes = std::fs::read(dir.path().join("vectors-000.bin")).unwrap();
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_corpus_builds_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let stats = build_index(&[], &driver(8), &config(8), dir.path())
            .await
            .unwrap();
        assert_eq!(stats.rows, 0);

        let manifest: Manifest =
            serde_json::from_slice(&std::fs::read(dir.path().join("manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest.rows, 0);
        assert_eq!(manifest.hnsw.entry_point, -1);
    }

    #[tokio::test]
    async fn test_invalid_chunker_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(8);
        cfg.chunker.overlap = cfg.chunker.size;
        let err = build_index(&[doc("a", "A", "text")], &driver(8), &cfg, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn test_load_jsonl_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(
            &path,
            "{\"slug\":\"a\",\"title\":\"A\",\"text\":\"body\"}\n\n{\"slug\":\"b\",\"text\":\"body b\",\"tags\":[\"t\"]}\n",
        )
        .unwrap();

        let docs = load_jsonl(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].slug, "a");
        assert_eq!(docs[1].tags, vec!["t"]);
        assert!(docs[1].title.is_empty());
    }

    #[test]
    fn test_load_jsonl_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "{\"slug\":\"a\",\"text\":\"x\"}\nnot json\n").unwrap();
        let err = load_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
