//! Common types for model-service providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when interacting with a provider.
///
/// The first three variants are the failure kinds callers branch on:
/// the service cannot be reached, the model is unknown to it, or it
/// answered with something unusable.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Model service unavailable at {url}: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("Model '{0}' not found on the model service")]
    ModelNotFound(String),

    #[error("Malformed response from model service: {0}")]
    MalformedResponse(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Provider trait for model-service backends.
///
/// Implementations embed text, complete prompts and report which models
/// they can serve. Calls are awaited one at a time by the engine.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>>;

    /// Complete a prompt without streaming and return the full text.
    async fn generate(&self, request: GenerateRequest) -> Result<String>;

    /// List the models the service currently has available.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

/// Request for a single non-streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A model advertised by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

impl ModelInfo {
    /// Whether this entry serves `model`, treating an untagged name as `:latest`.
    pub fn matches(&self, model: &str) -> bool {
        fn normalize(name: &str) -> String {
            if name.contains(':') {
                name.to_string()
            } else {
                format!("{}:latest", name)
            }
        }
        normalize(&self.name) == normalize(model)
    }
}

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: String,
}

/// Response containing embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> ModelInfo {
        ModelInfo {
            name: name.to_string(),
            size: 0,
            modified_at: String::new(),
        }
    }

    #[test]
    fn test_model_matches_implicit_latest() {
        assert!(info("gemma:latest").matches("gemma"));
        assert!(info("gemma").matches("gemma:latest"));
        assert!(info("gemma:2b").matches("gemma:2b"));
        assert!(!info("gemma:2b").matches("gemma"));
        assert!(!info("llama3.2:latest").matches("gemma"));
    }

    #[test]
    fn test_generate_request_builder() {
        let req = GenerateRequest::new("gemma", "hello").with_temperature(0.1);
        assert_eq!(req.model, "gemma");
        assert_eq!(req.temperature, 0.1);
    }
}
