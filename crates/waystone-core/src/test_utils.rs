//! Shared fixtures for unit and integration tests.
//!
//! Tests embed with the deterministic hash backend so no model download
//! is needed and runs are bit-for-bit reproducible.

use crate::embedding::{EmbedDriver, HashEmbedder};
use crate::search::types::DocumentRecord;

/// Embedding driver over the hash backend at `dims`.
pub fn hash_driver(dims: usize) -> EmbedDriver {
    EmbedDriver::new(Box::new(HashEmbedder::new(dims)), dims)
}

/// Builds a document record.
pub fn doc(slug: &str, title: &str, text: &str, tags: &[&str]) -> DocumentRecord {
    DocumentRecord {
        slug: slug.to_string(),
        title: title.to_string(),
        text: text.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        aliases: Vec::new(),
    }
}

/// The three-document pets corpus used across scenario tests.
pub fn pets_corpus() -> Vec<DocumentRecord> {
    vec![
        doc(
            "notes/intro-to-cats",
            "Intro to Cats",
            "Cats are small carnivorous mammals kept at home. A cat purrs when content.",
            &["animal"],
        ),
        doc(
            "notes/dog-training",
            "Dog Training",
            "Training a dog takes patience, structure, and plenty of treats.",
            &[],
        ),
        doc(
            "notes/cat-grooming",
            "Cat Grooming",
            "Grooming a cat regularly keeps its coat healthy and reduces shedding.",
            &[],
        ),
    ]
}
