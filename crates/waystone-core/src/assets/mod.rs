//! Query-side asset loading.
//!
//! Fetches the manifest, vector shards, and graph blob from HTTP or a
//! local directory, consulting the content-hash cache first. All shard
//! vectors land in one contiguous fp32 buffer sized `rows × dims` so the
//! search hot loop runs over plain slices. Progress is reported after each
//! shard so a UI can show load state for large indexes.
//!
//! Every fetched payload is verified against its declared SHA-256; a
//! cached record that fails verification is treated as a miss, a network
//! payload that fails is fatal.

use crate::error::{AssetError, CacheError};
use crate::hnsw::{CsrGraph, VectorStore};
use crate::index::Manifest;
use crate::storage::ByteCache;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Load progress after each shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    /// Rows copied into the vector buffer so far
    pub loaded_rows: usize,
    /// Total rows the manifest declares
    pub total_rows: usize,
}

/// Cooperative cancellation flag checked between suspension points.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag for reuse after a reset.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Where index assets come from.
pub enum AssetSource {
    /// HTTP(S), with an optional site base URL for manifest-relative paths
    Http {
        /// Shared HTTP client
        client: reqwest::Client,
        /// Site origin the manifest paths are absolute against
        base: Option<String>,
        /// Directory portion of the manifest URL (fallback resolution)
        manifest_dir: String,
    },
    /// A local directory holding the build output
    Dir(PathBuf),
}

impl AssetSource {
    /// Chooses a source from the manifest URL.
    ///
    /// `http(s)://` URLs load over the network; anything else is treated
    /// as a filesystem path and assets resolve next to the manifest.
    pub fn for_manifest_url(manifest_url: &str, base_url: Option<&str>) -> Self {
        if manifest_url.starts_with("http://") || manifest_url.starts_with("https://") {
            let manifest_dir = manifest_url
                .rsplit_once('/')
                .map(|(dir, _)| dir.to_string())
                .unwrap_or_else(|| manifest_url.to_string());
            AssetSource::Http {
                client: reqwest::Client::new(),
                base: base_url.map(|b| b.trim_end_matches('/').to_string()),
                manifest_dir,
            }
        } else {
            let dir = PathBuf::from(manifest_url)
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            AssetSource::Dir(dir)
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        match self {
            AssetSource::Http { client, .. } => {
                let response = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| AssetError::FetchFailed(format!("{url}: {e}")))?;
                if !response.status().is_success() {
                    return Err(AssetError::FetchFailed(format!(
                        "{url}: HTTP {}",
                        response.status()
                    )));
                }
                Ok(response
                    .bytes()
                    .await
                    .map_err(|e| AssetError::FetchFailed(format!("{url}: {e}")))?
                    .to_vec())
            }
            AssetSource::Dir(_) => {
                std::fs::read(url).map_err(|e| AssetError::FetchFailed(format!("{url}: {e}")))
            }
        }
    }

    /// Resolves a manifest asset path (e.g. `/embeddings/vectors-000.bin`)
    /// to a fetchable location.
    fn resolve(&self, asset_path: &str) -> String {
        let file_name = asset_path.rsplit('/').next().unwrap_or(asset_path);
        match self {
            AssetSource::Http {
                base: Some(base), ..
            } => format!("{base}{asset_path}"),
            AssetSource::Http { manifest_dir, .. } => format!("{manifest_dir}/{file_name}"),
            AssetSource::Dir(dir) => dir.join(file_name).display().to_string(),
        }
    }
}

/// The decoded, queryable index.
#[derive(Debug)]
pub struct LoadedIndex {
    /// All vectors, contiguous row-major fp32
    pub vectors: VectorStore,
    /// The HNSW graph, or `None` when search must fall back to brute force
    pub graph: Option<CsrGraph>,
}

/// Manifest/shard/graph loader with hash-gated caching.
pub struct AssetLoader {
    source: AssetSource,
    cache: Option<Arc<dyn ByteCache>>,
}

impl AssetLoader {
    /// Creates a loader. `cache: None` disables caching entirely.
    pub fn new(source: AssetSource, cache: Option<Arc<dyn ByteCache>>) -> Self {
        Self { source, cache }
    }

    /// Fetches and validates the manifest.
    pub async fn load_manifest(&self, manifest_url: &str) -> Result<Manifest, AssetError> {
        let bytes = self.source.fetch_url(manifest_url).await?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| AssetError::InvalidManifest(e.to_string()))?;
        manifest.validate()?;
        info!(
            rows = manifest.rows,
            dims = manifest.dims,
            shards = manifest.vectors.shards.len(),
            "loaded manifest"
        );
        Ok(manifest)
    }

    /// Loads every shard and the graph blob described by `manifest`.
    ///
    /// `on_progress` fires after each shard with cumulative row counts.
    /// Cancellation is honored between fetches; a cancelled load returns
    /// [`AssetError::Cancelled`] and leaves no partial state behind.
    pub async fn load_index(
        &self,
        manifest: &Manifest,
        cancel: &CancelFlag,
        on_progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<LoadedIndex, AssetError> {
        let rows = manifest.rows;
        let dims = manifest.dims;
        let mut buffer = vec![0f32; rows * dims];
        let mut loaded_rows = 0usize;

        for shard in &manifest.vectors.shards {
            if cancel.is_cancelled() {
                return Err(AssetError::Cancelled);
            }

            let bytes = self.fetch_verified(&shard.path, &shard.sha256).await?;
            let values: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();

            let expected = shard.rows * dims;
            if values.len() != expected {
                return Err(AssetError::LengthMismatch {
                    expected,
                    actual: values.len(),
                });
            }

            let start = shard.row_offset * dims;
            buffer[start..start + expected].copy_from_slice(&values);
            loaded_rows += shard.rows;
            on_progress(LoadProgress {
                loaded_rows,
                total_rows: rows,
            });
        }

        let graph = if manifest.hnsw.entry_point < 0 {
            debug!("manifest has no entry point, brute-force search only");
            None
        } else {
            if cancel.is_cancelled() {
                return Err(AssetError::Cancelled);
            }
            let blob = self
                .fetch_verified(&manifest.hnsw.graph.path, &manifest.hnsw.graph.sha256)
                .await?;
            Some(CsrGraph::from_blob(
                &blob,
                &manifest.hnsw.graph.levels,
                rows,
                manifest.hnsw.entry_point as u32,
                manifest.hnsw.m,
            )?)
        };

        Ok(LoadedIndex {
            vectors: VectorStore::from_raw(buffer, dims),
            graph,
        })
    }

    /// Fetches an asset, preferring a cache record whose content matches
    /// the declared hash.
    async fn fetch_verified(&self, asset_path: &str, sha256: &str) -> Result<Vec<u8>, AssetError> {
        if let Some(cache) = &self.cache {
            match cache.get(sha256).await {
                Ok(Some(bytes)) if hash_matches(&bytes, sha256) => {
                    debug!(asset = asset_path, "asset cache hit");
                    return Ok(bytes);
                }
                Ok(Some(_)) => {
                    warn!(asset = asset_path, "cached bytes failed verification, refetching");
                }
                Ok(None) => {}
                Err(e) => log_cache_error(asset_path, &e),
            }
        }

        let location = self.source.resolve(asset_path);
        let bytes = self.source.fetch_url(&location).await?;
        if !hash_matches(&bytes, sha256) {
            return Err(AssetError::HashMismatch(asset_path.to_string()));
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(sha256, &bytes).await {
                log_cache_error(asset_path, &e);
            }
        }

        Ok(bytes)
    }
}

fn hash_matches(bytes: &[u8], expected: &str) -> bool {
    format!("{:x}", Sha256::digest(bytes)) == expected
}

fn log_cache_error(asset: &str, err: &CacheError) {
    // Cache trouble never fails a load.
    warn!(asset, error = %err, "asset cache error, bypassing");
}
