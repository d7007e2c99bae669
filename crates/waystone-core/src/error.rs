//! Error types for waystone-core.
//!
//! Each subsystem gets its own error enum so callers can apply the right
//! recovery policy: cache errors are logged and bypassed, asset errors kill
//! the semantic path, embed errors disable semantic search for the session,
//! and query errors surface as empty result sets.

use thiserror::Error;

/// Errors raised while validating configuration at startup.
///
/// Config errors are fatal at init time: the build aborts, the query side
/// renders search disabled.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Required model identifier is missing or empty
    #[error("Missing model id")]
    MissingModel,
    /// Embedding dimension is zero or otherwise unusable
    #[error("Invalid dims: {0}")]
    InvalidDims(usize),
    /// Chunker window/overlap combination is unusable
    #[error("Invalid chunking config: {0}")]
    InvalidChunking(String),
    /// Endpoint URL could not be normalized
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
    /// Unsupported vector dtype (only fp32 is supported)
    #[error("Unsupported dtype: {0}")]
    UnsupportedDtype(String),
}

/// Errors raised while fetching or decoding index assets.
///
/// Asset errors are fatal for the worker; the UI falls back to lexical-only.
#[derive(Debug, Clone, Error)]
pub enum AssetError {
    /// Fetch over HTTP or filesystem failed
    #[error("Failed to load asset: {0}")]
    FetchFailed(String),
    /// Manifest JSON failed to parse or validate
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
    /// Decoded shard does not match the declared geometry
    #[error("Shard length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch {
        /// Expected element count (`rows * dims`)
        expected: usize,
        /// Actual element count decoded from bytes
        actual: usize,
    },
    /// Downloaded bytes do not match the declared content hash
    #[error("Content hash mismatch for {0}")]
    HashMismatch(String),
    /// Graph blob failed structural validation
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),
    /// Load was cancelled by a reset
    #[error("Load cancelled")]
    Cancelled,
}

/// Errors from the persistent asset cache.
///
/// Never fatal: callers log and fall through to a network fetch.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Read from the backing store failed
    #[error("Cache read failed: {0}")]
    ReadFailed(String),
    /// Write to the backing store failed
    #[error("Cache write failed: {0}")]
    WriteFailed(String),
}

/// Errors from embedding backends.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    /// Model weights or tokenizer could not be loaded
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    /// Tokenization failed
    #[error("Tokenization failed: {0}")]
    TokenizationFailed(String),
    /// Forward pass or remote inference failed
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    /// Remote endpoint rejected the request (4xx - not retried)
    #[error("Embedding request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },
    /// Transient failure that exhausted its retry budget
    #[error("Embedding request failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: usize,
        /// Last error observed
        message: String,
    },
    /// Returned vector has the wrong dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension
        expected: usize,
        /// Actual dimension received
        actual: usize,
    },
}

impl EmbedError {
    /// Whether this failure is permanent (retrying cannot help).
    ///
    /// Permanent failures abort a build; transient ones are retried with
    /// backoff up to the attempt budget.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            EmbedError::Rejected { .. } | EmbedError::DimensionMismatch { .. }
        )
    }
}

/// Errors surfaced to the query layer.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Worker is not initialized or its channel is gone
    #[error("Search worker unavailable: {0}")]
    WorkerUnavailable(String),
    /// Semantic path failed for this query
    #[error("Semantic search failed: {0}")]
    SemanticFailed(String),
}

/// Errors from the offline build pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Corpus file could not be read or parsed
    #[error("Failed to read corpus: {0}")]
    CorpusRead(String),
    /// Embedding stage failed
    #[error(transparent)]
    Embed(#[from] EmbedError),
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Artifact write failed
    #[error("Failed to write artifact {path}: {source}")]
    Write {
        /// Artifact path
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

impl From<AssetError> for QueryError {
    fn from(err: AssetError) -> Self {
        QueryError::WorkerUnavailable(err.to_string())
    }
}

impl From<EmbedError> for QueryError {
    fn from(err: EmbedError) -> Self {
        QueryError::SemanticFailed(err.to_string())
    }
}
