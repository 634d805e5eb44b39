use serde::{Deserialize, Serialize};
use std::fmt;

/// How a document's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Pdf,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Text => write!(f, "text"),
            DocumentKind::Pdf => write!(f, "pdf"),
        }
    }
}

/// A source document loaded from the document folder.
///
/// Documents are rebuilt on every load and never mutated afterwards. The
/// `source` is the file name relative to the document folder and is the
/// document's identity in the cache manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub content: String,
    pub kind: DocumentKind,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            kind,
        }
    }
}

/// A bounded, overlapping slice of a document.
///
/// `start_offset` counts characters, not bytes, from the start of the
/// document content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: String,
    pub content: String,
    pub start_offset: usize,
    pub kind: DocumentKind,
}

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub metadata: Chunk,
    pub vector: Vec<f32>,
}

/// A search result containing a chunk and its similarity score.
///
/// Returned by [`search`](super::search::search), ordered by descending
/// similarity.
///
/// # Score Range
///
/// Cosine similarity lies in `[-1.0, 1.0]`:
/// - `1.0` - Same direction (perfect match)
/// - `0.0` - Orthogonal, or one side has a zero vector
/// - `-1.0` - Opposite direction
///
/// Text embeddings usually land between 0.0 and 1.0, but nothing here
/// relies on that.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub metadata: Chunk,
    pub similarity: f32,
}
