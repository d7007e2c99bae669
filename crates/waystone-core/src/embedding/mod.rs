//! Embedding backends and the driver that fronts them.
//!
//! Two backends produce vectors: a local transformer encoder
//! ([`LocalEmbedder`]) and a remote OpenAI-compatible endpoint
//! ([`RemoteEmbedder`]). [`EmbedDriver`] wraps either one and owns the
//! cross-cutting concerns: query/passage prompt asymmetry, dimension
//! coercion, and L2 normalization. Build code embeds passages, query code
//! embeds queries; the asymmetry must be honored or retrieval collapses.

pub mod hash;
pub mod local;
pub mod prefix;
pub mod remote;

pub use hash::{HashEmbedder, HASH_MODEL_ID};
pub use local::LocalEmbedder;
pub use prefix::{apply_prefix, prefix_for, TextKind};
pub use remote::{resolve_base_url, RemoteEmbedder};

use crate::error::EmbedError;
use async_trait::async_trait;
use tracing::debug;

/// A source of dense text embeddings.
///
/// Implementations receive fully-prefixed text; prompt asymmetry is handled
/// by [`EmbedDriver`] above this trait.
#[async_trait]
pub trait EmbedBackend: Send + Sync {
    /// The model identifier this backend embeds with.
    fn model_id(&self) -> &str;

    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embedding driver: prefixing, dimension coercion, normalization.
///
/// The driver is the only embedding entry point the rest of the crate uses.
/// Output vectors always have exactly `dims` components and unit L2 norm.
pub struct EmbedDriver {
    backend: Box<dyn EmbedBackend>,
    dims: usize,
}

impl EmbedDriver {
    /// Wraps a backend, pinning the output dimension.
    pub fn new(backend: Box<dyn EmbedBackend>, dims: usize) -> Self {
        Self { backend, dims }
    }

    /// Output dimension of every vector this driver produces.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Model identifier of the wrapped backend.
    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Embeds document chunks with the passage-side prompt.
    pub async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.embed(texts, TextKind::Passage).await
    }

    /// Embeds a single query with the query-side prompt.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed(&[text.to_string()], TextKind::Query).await?;
        vectors.pop().ok_or_else(|| {
            EmbedError::InferenceFailed("backend returned no vector for query".to_string())
        })
    }

    async fn embed(&self, texts: &[String], kind: TextKind) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_id = self.backend.model_id();
        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| apply_prefix(model_id, kind, t))
            .collect();

        let raw = self.backend.embed_batch(&prefixed).await?;
        if raw.len() != texts.len() {
            return Err(EmbedError::InferenceFailed(format!(
                "backend returned {} vectors for {} inputs",
                raw.len(),
                texts.len()
            )));
        }

        Ok(raw
            .into_iter()
            .map(|v| {
                let mut v = coerce_dims(v, self.dims);
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

/// Truncates or zero-pads a vector to `dims` components.
///
/// Matryoshka-style models are commonly served at a larger native dimension
/// than the index stores; padding covers the rare opposite case.
pub fn coerce_dims(mut v: Vec<f32>, dims: usize) -> Vec<f32> {
    if v.len() != dims {
        debug!(from = v.len(), to = dims, "coercing embedding dimension");
        v.resize(dims, 0.0);
    }
    v
}

/// Scales `v` to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
