//! Model-service provider abstraction layer.
//!
//! This module defines a common interface for the service that embeds text
//! and completes prompts, with an Ollama HTTP implementation.

mod types;
pub mod ollama;

// Re-export common types
pub use types::{
    Provider,
    ProviderError,
    Result,
    GenerateRequest,
    ModelInfo,
    EmbedRequest,
    EmbedResponse,
};

pub use ollama::OllamaProvider;
