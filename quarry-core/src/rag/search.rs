//! Exact vector search over the in-memory embedding table.
//!
//! Every record is scored against the query with cosine similarity; there
//! is no approximate index. Time is O(n * d) for n records of dimension d.

use super::types::{EmbeddingRecord, SearchResult};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("top_k must be at least 1")]
    InvalidTopK,
}

/// Ranks `records` against `query_embedding` and keeps the best `top_k`.
///
/// Results are sorted by descending similarity. Equal scores keep the
/// records' original order, so a fixed table always ranks the same way.
/// Returns `min(top_k, records.len())` results; an empty table returns an
/// empty list without doing any work.
///
/// # Example
///
/// ```
/// # use quarry_core::rag::{search, Chunk, DocumentKind, EmbeddingRecord};
/// let chunk = |s: &str| Chunk {
///     source: "pets.txt".into(),
///     content: s.into(),
///     start_offset: 0,
///     kind: DocumentKind::Text,
/// };
/// let records = vec![
///     EmbeddingRecord { metadata: chunk("cats"), vector: vec![1.0, 0.0, 0.0] },
///     EmbeddingRecord { metadata: chunk("dogs"), vector: vec![0.0, 1.0, 0.0] },
/// ];
///
/// let results = search(&[1.0, 0.0, 0.0], &records, 5).unwrap();
/// assert_eq!(results[0].metadata.content, "cats");
/// assert_eq!(results[0].similarity, 1.0);
/// ```
pub fn search(
    query_embedding: &[f32],
    records: &[EmbeddingRecord],
    top_k: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    if top_k == 0 {
        return Err(SearchError::InvalidTopK);
    }
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let query_norm = norm(query_embedding);

    let mut scored: Vec<(usize, f32)> = records
        .iter()
        .enumerate()
        .map(|(i, record)| (i, cosine_with_norm(query_embedding, query_norm, &record.vector)))
        .collect();

    // Stable sort: ties stay in insertion order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    Ok(scored
        .into_iter()
        .take(top_k)
        .map(|(i, similarity)| SearchResult {
            metadata: records[i].metadata.clone(),
            similarity,
        })
        .collect())
}

/// Computes cosine similarity between two vectors.
///
/// Returns values from -1.0 (opposite) to 1.0 (identical), with 0.0 indicating
/// orthogonal vectors. Returns 0.0 for mismatched lengths or zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norm(a, norm(a), b)
}

fn cosine_with_norm(a: &[f32], magnitude_a: f32, b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let magnitude_b = norm(b);
    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let similarity = dot_product / (magnitude_a * magnitude_b);
    if similarity.is_nan() {
        return 0.0;
    }
    // Rounding can push parallel vectors a hair past 1.
    similarity.clamp(-1.0, 1.0)
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
