//! The semantic search worker.
//!
//! A dedicated OS thread owns everything the vector path needs: the
//! contiguous vector buffer, the CSR graph views, the cache handle, and
//! the (lazily constructed) embedding model. Callers talk to it through a
//! channel protocol mirroring a web worker surface:
//!
//! - `init` → zero or more `progress` events, then ready or an error
//! - `search` → a response carrying the originating `seq`
//! - `reset` → aborts an in-flight load at its next suspension point and
//!   discards all state
//!
//! Work inside the thread is single-threaded cooperative; the hot path
//! (graph traversal, dot products) runs to completion between suspension
//! points. The UI side never touches vector memory, it only sees
//! `(chunk slug, score)` pairs.

use crate::assets::{AssetLoader, AssetSource, CancelFlag, LoadProgress};
use crate::embedding::{EmbedDriver, HashEmbedder, LocalEmbedder, RemoteEmbedder};
use crate::error::QueryError;
use crate::hnsw::{brute_force_search, hnsw_search, CsrGraph, SearchParams, VectorStore};
use crate::index::Manifest;
use crate::search::types::SemanticHit;
use crate::storage::ByteCache;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Which embedding backend the worker builds on first use.
#[derive(Debug, Clone)]
pub enum EmbedderConfig {
    /// OpenAI-compatible endpoint
    Remote {
        /// Endpoint URL (any of the accepted forms)
        url: String,
        /// Model identifier
        model: String,
        /// Texts per request
        batch_size: usize,
        /// In-flight requests
        concurrency: usize,
    },
    /// Local candle model directory
    Local {
        /// Directory with `model.safetensors`, `config.json`, `tokenizer.json`
        model_dir: PathBuf,
        /// Model identifier (drives prompt prefixing)
        model_id: String,
    },
    /// Deterministic hash projection; must match an index built with the
    /// same backend
    Hash,
}

/// Worker configuration carried by `init`.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Embedding backend to construct on first query
    pub embedder: EmbedderConfig,
    /// Query-time beam parameters
    pub search_params: SearchParams,
}

/// The `init` request payload.
pub struct InitRequest {
    /// Worker configuration
    pub config: WorkerConfig,
    /// Manifest location (HTTP URL or filesystem path)
    pub manifest_url: String,
    /// Optional site base URL for manifest-relative asset paths
    pub base_url: Option<String>,
    /// Skip the persistent cache entirely
    pub disable_cache: bool,
    /// Cache handle; ignored when `disable_cache` is set
    pub cache: Option<Arc<dyn ByteCache>>,
}

/// A search response; `seq` always echoes the request.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Originating sequence token
    pub seq: u64,
    /// Chunk-level hits, score descending
    pub result: Result<Vec<SemanticHit>, QueryError>,
}

enum Request {
    Init {
        request: InitRequest,
        progress: mpsc::UnboundedSender<LoadProgress>,
        done: oneshot::Sender<Result<Manifest, QueryError>>,
    },
    Search {
        text: String,
        k: usize,
        seq: u64,
        respond: oneshot::Sender<SearchResponse>,
    },
    Reset,
}

/// Handle to the worker thread. Cloning shares the same worker.
#[derive(Clone)]
pub struct SearchWorker {
    tx: mpsc::UnboundedSender<Request>,
    cancel: CancelFlag,
}

impl SearchWorker {
    /// Spawns the worker thread with its own current-thread runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();
        let thread_cancel = cancel.clone();

        std::thread::Builder::new()
            .name("search-worker".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build worker runtime");
                runtime.block_on(worker_loop(rx, thread_cancel));
            })
            .expect("failed to spawn search worker thread");

        Self { tx, cancel }
    }

    /// Initializes the worker: loads the manifest, shards, and graph.
    ///
    /// `progress` receives a [`LoadProgress`] after each shard. Resolves
    /// once with the loaded manifest (ready) or the error that killed the
    /// load; the manifest carries the chunk metadata the session needs for
    /// document aggregation.
    pub async fn init(
        &self,
        request: InitRequest,
        progress: mpsc::UnboundedSender<LoadProgress>,
    ) -> Result<Manifest, QueryError> {
        let (done, done_rx) = oneshot::channel();
        self.tx
            .send(Request::Init {
                request,
                progress,
                done,
            })
            .map_err(|_| QueryError::WorkerUnavailable("worker thread gone".to_string()))?;
        done_rx
            .await
            .map_err(|_| QueryError::WorkerUnavailable("worker dropped init".to_string()))?
    }

    /// Runs a semantic search. The response echoes `seq` so the caller
    /// can drop superseded answers.
    pub async fn search(&self, text: &str, k: usize, seq: u64) -> SearchResponse {
        let (respond, rx) = oneshot::channel();
        let sent = self.tx.send(Request::Search {
            text: text.to_string(),
            k,
            seq,
            respond,
        });
        if sent.is_err() {
            return SearchResponse {
                seq,
                result: Err(QueryError::WorkerUnavailable(
                    "worker thread gone".to_string(),
                )),
            };
        }
        rx.await.unwrap_or(SearchResponse {
            seq,
            result: Err(QueryError::WorkerUnavailable(
                "worker dropped request".to_string(),
            )),
        })
    }

    /// Aborts any in-flight load at its next suspension point and
    /// discards worker state.
    pub fn reset(&self) {
        self.cancel.cancel();
        let _ = self.tx.send(Request::Reset);
    }
}

/// Everything the worker owns once initialized.
struct WorkerState {
    manifest: Manifest,
    vectors: VectorStore,
    graph: Option<CsrGraph>,
    config: WorkerConfig,
    /// Lazily constructed on the first search and reused after
    driver: Option<EmbedDriver>,
}

async fn worker_loop(mut rx: mpsc::UnboundedReceiver<Request>, cancel: CancelFlag) {
    let mut state: Option<WorkerState> = None;

    while let Some(request) = rx.recv().await {
        match request {
            Request::Init {
                request,
                progress,
                done,
            } => {
                cancel.clear();
                let outcome = initialize(request, &cancel, &progress).await;
                match outcome {
                    Ok(new_state) => {
                        info!(rows = new_state.manifest.rows, "search worker ready");
                        let manifest = new_state.manifest.clone();
                        state = Some(new_state);
                        let _ = done.send(Ok(manifest));
                    }
                    Err(e) => {
                        warn!(error = %e, "search worker init failed");
                        state = None;
                        let _ = done.send(Err(e.into()));
                    }
                }
            }
            Request::Search {
                text,
                k,
                seq,
                respond,
            } => {
                let result = match state.as_mut() {
                    Some(state) => run_search(state, &text, k).await,
                    None => Err(QueryError::WorkerUnavailable(
                        "worker not initialized".to_string(),
                    )),
                };
                let _ = respond.send(SearchResponse { seq, result });
            }
            Request::Reset => {
                debug!("search worker reset");
                state = None;
                cancel.clear();
            }
        }
    }
}

async fn initialize(
    request: InitRequest,
    cancel: &CancelFlag,
    progress: &mpsc::UnboundedSender<LoadProgress>,
) -> Result<WorkerState, crate::error::AssetError> {
    let source = AssetSource::for_manifest_url(&request.manifest_url, request.base_url.as_deref());
    let cache = if request.disable_cache {
        None
    } else {
        request.cache
    };
    let loader = AssetLoader::new(source, cache);

    let manifest = loader.load_manifest(&request.manifest_url).await?;
    let loaded = loader
        .load_index(&manifest, cancel, &mut |p| {
            let _ = progress.send(p);
        })
        .await?;

    Ok(WorkerState {
        manifest,
        vectors: loaded.vectors,
        graph: loaded.graph,
        config: request.config,
        driver: None,
    })
}

async fn run_search(
    state: &mut WorkerState,
    text: &str,
    k: usize,
) -> Result<Vec<SemanticHit>, QueryError> {
    if text.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    if state.driver.is_none() {
        state.driver = Some(build_driver(&state.config.embedder, state.manifest.dims)?);
    }
    let driver = state.driver.as_ref().expect("driver just constructed");

    let query = driver.embed_query(text).await?;

    let raw = match &state.graph {
        Some(graph) => hnsw_search(
            &state.vectors,
            graph,
            &query,
            k,
            &state.config.search_params,
        ),
        None => brute_force_search(&state.vectors, &query, k),
    };

    Ok(raw
        .into_iter()
        .map(|(row, score)| SemanticHit {
            id: state.manifest.ids[row as usize].clone(),
            score,
        })
        .collect())
}

fn build_driver(config: &EmbedderConfig, dims: usize) -> Result<EmbedDriver, QueryError> {
    match config {
        EmbedderConfig::Remote {
            url,
            model,
            batch_size,
            concurrency,
        } => {
            let backend = RemoteEmbedder::new(url, model, *batch_size, *concurrency)
                .map_err(|e| QueryError::SemanticFailed(e.to_string()))?;
            Ok(EmbedDriver::new(Box::new(backend), dims))
        }
        EmbedderConfig::Local {
            model_dir,
            model_id,
        } => {
            let backend = LocalEmbedder::from_dir(model_dir, model_id)
                .map_err(|e| QueryError::SemanticFailed(e.to_string()))?;
            Ok(EmbedDriver::new(Box::new(backend), dims))
        }
        EmbedderConfig::Hash => Ok(EmbedDriver::new(Box::new(HashEmbedder::new(dims)), dims)),
    }
}
