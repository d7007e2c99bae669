//! Core types shared across the search layers.

use serde::{Deserialize, Serialize};

/// A corpus document: immutable input to the build, lexical source at
/// query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Stable slug identifying the document
    pub slug: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Full plain-text body
    pub text: String,
    /// Tag set
    #[serde(default)]
    pub tags: Vec<String>,
    /// Alternative titles
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// One chunk-level semantic hit from the vector path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    /// Chunk slug (`<parentSlug>#chunk<N>` for chunked documents)
    pub id: String,
    /// Cosine similarity to the query, in `[-1, 1]`
    pub score: f32,
}

/// A fused document-level result, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    /// Document slug
    pub slug: String,
    /// Display title, when known
    pub title: Option<String>,
    /// Final fused relevance score
    pub score: f32,
    /// Best semantic chunk score mapped to `[0, 100]`, display only
    pub match_percent: Option<f32>,
}
