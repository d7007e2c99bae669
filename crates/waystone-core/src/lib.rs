//! # Waystone Core
//!
//! Hybrid search for a static documentation site: an offline build
//! pipeline that chunks and embeds a corpus into sharded fp32 vectors
//! plus a serialized HNSW graph, and a query engine that fuses lexical
//! and semantic retrieval over those artifacts.
//!
//! ## Modules
//!
//! - [`build`] - Offline pipeline: corpus → shards + graph + manifest
//! - [`chunking`] - Overlapping sliding-window document chunking
//! - [`embedding`] - Local (candle), remote (OpenAI-compatible), and hash
//!   embedding backends behind one driver
//! - [`index`] - Manifest wire format and artifact writer
//! - [`hnsw`] - HNSW construction, CSR graph views, and search
//! - [`assets`] - Query-side asset loading with a content-hash cache
//! - [`lexical`] - Multi-field forward-token prefix index
//! - [`search`] - Aggregation, fusion, and the interactive session
//! - [`worker`] - The dedicated search worker thread and its protocol
//! - [`storage`] - Persistent byte cache backends
//! - [`config`] - Production constants
//! - [`error`] - Per-domain error types

pub mod assets;
pub mod build;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod hnsw;
pub mod index;
pub mod lexical;
pub mod search;
pub mod storage;
pub mod worker;

#[doc(hidden)]
pub mod test_utils;

pub use error::{AssetError, BuildError, CacheError, ConfigError, EmbedError, QueryError};
pub use search::{DocumentRecord, FusedResult, SearchMode, SearchSession, SemanticHit};
pub use worker::{EmbedderConfig, InitRequest, SearchWorker, WorkerConfig};
