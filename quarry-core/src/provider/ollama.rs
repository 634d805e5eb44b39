//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements the Provider trait.

use super::types::*;
use async_trait::async_trait;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Timeout for the model-list probe made at startup.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    http_client: reqwest::Client,
    embed_timeout: Duration,
    generate_timeout: Duration,
}

impl OllamaProvider {
    /// Creates a new Ollama provider with the specified config.
    pub fn new(config: &crate::Config) -> Self {
        Self {
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            embed_timeout: config.rag.embed_timeout(),
            generate_timeout: config.llm.timeout(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_connect() || err.is_timeout() {
            ProviderError::Unavailable {
                url: self.base_url.clone(),
                reason: err.to_string(),
            }
        } else {
            ProviderError::Request(err)
        }
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        model: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), &body, model))
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String> {
        response.text().await.map_err(|e| self.send_error(e))
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        let config = crate::Config::default();
        Self::new(&config)
    }
}

/// Maps a non-success response onto the provider error kinds.
///
/// Ollama answers an unknown model with 404 and a body like
/// `{"error":"model \"x\" not found, try pulling it first"}`. An empty
/// `model` means no model was named, so a 404 cannot mean a missing model.
fn classify_failure(status: u16, body: &str, model: &str) -> ProviderError {
    let not_found = status == 404 || body.to_lowercase().contains("not found");
    if not_found && !model.is_empty() {
        return ProviderError::ModelNotFound(model.to_string());
    }
    let message = serde_json::from_str::<OllamaErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string());
    ProviderError::Api { status, message }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);

        let embed_request = EmbedRequest {
            model: model.to_string(),
            input: text.to_string(),
        };

        let response = self.http_client
            .post(&url)
            .timeout(self.embed_timeout)
            .json(&embed_request)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let response = self.check_status(response, model).await?;
        let body = self.read_body(response).await?;

        let embed_response: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let embedding = embed_response.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no embeddings returned".to_string()))?;

        if embedding.is_empty() {
            return Err(ProviderError::MalformedResponse("empty embedding vector".to_string()));
        }

        debug!(model, dimension = embedding.len(), "Embedding received");
        Ok(embedding)
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let ollama_request = OllamaGenerateRequest {
            model: request.model.clone(),
            prompt: request.prompt,
            stream: false,
            options: {
                let mut opts = HashMap::new();
                opts.insert("temperature".to_string(), serde_json::json!(request.temperature));
                opts
            },
        };

        let response = self.http_client
            .post(&url)
            .timeout(self.generate_timeout)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let response = self.check_status(response, &request.model).await?;
        let body = self.read_body(response).await?;

        let generated: OllamaGenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        Ok(generated.response)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.http_client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        // Anything but a model list means this is not an Ollama endpoint.
        let response = match self.check_status(response, "").await {
            Ok(response) => response,
            Err(ProviderError::Api { status, message }) => {
                return Err(ProviderError::Unavailable {
                    url: self.base_url.clone(),
                    reason: format!("/api/tags answered {}: {}", status, message.trim()),
                });
            }
            Err(e) => return Err(e),
        };
        let body = self.read_body(response).await?;

        let tags: OllamaTagsResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        Ok(tags.models)
    }
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaErrorBody {
    error: String,
}
