//! Types for text chunking.

/// A chunk of text with its position in the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Index of this chunk within the document (0-based)
    pub index: usize,
    /// The text content of this chunk
    pub text: String,
    /// Byte offset where this chunk starts in the original document
    pub start: usize,
    /// Byte offset where this chunk ends in the original document
    pub end: usize,
}
