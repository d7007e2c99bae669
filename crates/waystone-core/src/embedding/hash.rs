//! Deterministic hash-projection embeddings.
//!
//! A model-free backend: each token is FNV-1a hashed into a signed
//! contribution across the vector, so texts sharing tokens land near each
//! other. Quality is far below a real model, but it needs no weights, no
//! network, and is bit-for-bit reproducible, which makes it the backend of
//! choice for tests, CI, and smoke-testing an index build end to end.

use super::EmbedBackend;
use crate::error::EmbedError;
use async_trait::async_trait;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Identifier reported (and matched by the CLI) for this backend.
pub const HASH_MODEL_ID: &str = "hash";

/// Hash-projection embedder.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    /// Creates a hash embedder producing `dims`-component vectors.
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            accumulate(&mut embedding, token, 1.0);
        }
        embedding
    }
}

fn accumulate(embedding: &mut [f32], token: &str, weight: f32) {
    let token_hash = fnv1a(token.as_bytes());
    for i in 0..embedding.len() {
        let dim_hash = fnv1a_with_salt(token_hash, i as u64);
        let sign = if dim_hash & 1 == 0 { weight } else { -weight };
        let dim = ((dim_hash >> 1) as usize) % embedding.len();
        embedding[dim] += sign;
    }
}

fn fnv1a_with_salt(seed: u64, salt: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..].copy_from_slice(&salt.to_le_bytes());
    fnv1a(&bytes)
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[async_trait]
impl EmbedBackend for HashEmbedder {
    fn model_id(&self) -> &str {
        HASH_MODEL_ID
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed_batch(&["hello world".to_string()]).await.unwrap();
        let b = embedder.embed_batch(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_shared_tokens_increase_similarity() {
        let embedder = HashEmbedder::new(64);
        let vectors = embedder
            .embed_batch(&[
                "cats are mammals".to_string(),
                "cats are animals".to_string(),
                "quantum chromodynamics lattice".to_string(),
            ])
            .await
            .unwrap();

        let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
        let cos = |a: &[f32], b: &[f32]| {
            a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>() / (norm(a) * norm(b))
        };

        let related = cos(&vectors[0], &vectors[1]);
        let unrelated = cos(&vectors[0], &vectors[2]);
        assert!(
            related > unrelated,
            "related {related} should exceed unrelated {unrelated}"
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed_batch(&["   ".to_string()]).await.unwrap();
        assert!(v[0].iter().all(|&x| x == 0.0));
    }
}
