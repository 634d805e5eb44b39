//! Embedding generation using the model-service provider.
//!
//! This module converts text into vector embeddings and enforces that every
//! vector produced in a session has the same dimensionality.

use crate::provider::{Provider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The provider API returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The service returned a vector of a different length than earlier calls.
    #[error("Embedding dimension changed: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Generates vector embeddings for text using a provider embedding model.
///
/// The dimensionality is learned from the first successful call, or seeded
/// from a loaded cache with [`set_dimension`](Self::set_dimension). Any later
/// vector of a different length is rejected. Failures are returned as-is;
/// retrying is the caller's decision.
///
/// # Supported Models
///
/// Common embedding models:
/// - `nomic-embed-text` - 768-dimensional embeddings, good general purpose
/// - `mxbai-embed-large` - 1024-dimensional embeddings, higher quality
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
    dimension: Option<usize>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            dimension: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The dimensionality established so far, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Pins the expected dimensionality, e.g. to the one found in a cache.
    pub fn set_dimension(&mut self, dimension: Option<usize>) {
        self.dimension = dimension;
    }

    /// Generates a vector embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model service is unreachable
    /// - The model is not available
    /// - The response carries no usable embedding
    /// - The vector length differs from the session's dimensionality
    pub async fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text, &self.model).await?;

        match self.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(EmbedderError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => {
                debug!(dimension = vector.len(), "Embedding dimension discovered");
                self.dimension = Some(vector.len());
            }
        }

        Ok(vector)
    }

    /// Embeds each text in order, one call at a time.
    ///
    /// Stops at the first failure; no partial batch is returned.
    pub async fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            debug!("Embedding text {}/{}", i + 1, texts.len());
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{GenerateRequest, ModelInfo};
    use async_trait::async_trait;

    /// Returns vectors whose length is the text length.
    struct LengthProvider;

    #[async_trait]
    impl Provider for LengthProvider {
        async fn embed(&self, text: &str, _model: &str) -> crate::provider::Result<Vec<f32>> {
            Ok(vec![1.0; text.len()])
        }

        async fn generate(&self, _request: GenerateRequest) -> crate::provider::Result<String> {
            Ok(String::new())
        }

        async fn list_models(&self) -> crate::provider::Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_dimension_discovered_from_first_call() {
        let mut embedder = Embedder::new(Arc::new(LengthProvider), "m");
        assert_eq!(embedder.dimension(), None);
        embedder.embed("abcd").await.unwrap();
        assert_eq!(embedder.dimension(), Some(4));
        embedder.embed("wxyz").await.unwrap();
    }

    #[tokio::test]
    async fn test_dimension_change_rejected() {
        let mut embedder = Embedder::new(Arc::new(LengthProvider), "m");
        embedder.embed("abcd").await.unwrap();
        let err = embedder.embed("abc").await.unwrap_err();
        assert!(matches!(
            err,
            EmbedderError::DimensionMismatch { expected: 4, actual: 3 }
        ));
    }

    #[tokio::test]
    async fn test_seeded_dimension_enforced() {
        let mut embedder = Embedder::new(Arc::new(LengthProvider), "m");
        embedder.set_dimension(Some(2));
        assert!(embedder.embed("abc").await.is_err());
        assert!(embedder.embed("ab").await.is_ok());
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let mut embedder = Embedder::new(Arc::new(LengthProvider), "m");
        let vectors = embedder.embed_batch(&["aa", "bb", "cc"]).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 2));
    }
}
