//! Search execution: corpus + index → fused results.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use waystone_core::build::load_jsonl;
use waystone_core::hnsw::SearchParams;
use waystone_core::lexical::LexicalIndex;
use waystone_core::search::session::{RenderEvent, RenderPhase};
use waystone_core::search::SearchMode;
use waystone_core::storage::{ByteCache, RedbCache};
use waystone_core::{
    EmbedderConfig, FusedResult, InitRequest, SearchSession, SearchWorker, WorkerConfig,
};

/// Everything a single CLI query needs.
pub struct SearchRequest {
    /// Query term as typed (may start with `#tag`)
    pub query: String,
    /// Index directory holding `manifest.json` and blobs
    pub index_dir: PathBuf,
    /// Corpus JSONL powering the lexical index
    pub jsonl: PathBuf,
    /// Active retrieval mode
    pub mode: SearchMode,
    /// Embedding backend matching the index build
    pub embedder: EmbedderConfig,
    /// Skip the persistent asset cache
    pub no_cache: bool,
    /// Asset cache location
    pub cache_path: PathBuf,
}

/// The outcome handed to the output formatter.
pub struct SearchOutcome {
    /// Final ranked documents
    pub results: Vec<FusedResult>,
    /// Whether the semantic path contributed to the results
    pub semantic_used: bool,
    /// Degradation notice, when the semantic path died
    pub semantic_error: Option<String>,
}

/// Runs one fused search end to end.
pub async fn execute_search(request: SearchRequest) -> Result<SearchOutcome> {
    let docs = load_jsonl(&request.jsonl)
        .with_context(|| format!("failed to load corpus {}", request.jsonl.display()))?;
    let lexical = LexicalIndex::build(&docs);
    info!(documents = docs.len(), "lexical index ready");

    let worker = SearchWorker::spawn();
    let (progress_tx, _progress_rx) = mpsc::unbounded_channel();

    let cache: Option<Arc<dyn ByteCache>> = if request.no_cache {
        None
    } else {
        match RedbCache::open(&request.cache_path) {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                // Cache trouble never blocks a search.
                warn!(error = %e, "asset cache unavailable, loading without it");
                None
            }
        }
    };

    let manifest_url = manifest_path(&request.index_dir);
    let init = worker
        .init(
            InitRequest {
                config: WorkerConfig {
                    embedder: request.embedder.clone(),
                    search_params: SearchParams::default(),
                },
                manifest_url,
                base_url: None,
                disable_cache: request.no_cache,
                cache,
            },
            progress_tx,
        )
        .await;

    let (chunk_metadata, semantic_available, init_error) = match init {
        Ok(manifest) => (manifest.chunk_metadata, true, None),
        Err(e) => {
            warn!(error = %e, "semantic index unavailable, lexical only");
            (None, false, Some(e.to_string()))
        }
    };

    let (render_tx, mut render_rx) = mpsc::unbounded_channel();
    let session = SearchSession::new(
        lexical,
        worker,
        chunk_metadata,
        request.mode,
        semantic_available,
        render_tx,
    );
    session.search_now(&request.query).await;
    drop(session);

    // Keep the richest render that arrived; fused supersedes interim.
    let mut results = Vec::new();
    let mut semantic_used = false;
    let mut semantic_error = init_error;
    while let Some(event) = render_rx.recv().await {
        match event {
            RenderEvent::Results {
                phase, results: r, ..
            } => {
                semantic_used = phase == RenderPhase::Fused;
                results = r;
            }
            RenderEvent::SemanticDisabled { message } => {
                semantic_error = Some(message);
            }
        }
    }

    Ok(SearchOutcome {
        results,
        semantic_used,
        semantic_error,
    })
}

fn manifest_path(index_dir: &Path) -> String {
    index_dir.join("manifest.json").display().to_string()
}
