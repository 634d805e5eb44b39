//! quarry-core - Local document retrieval engine
//!
//! Answers questions about a folder of text and PDF documents:
//! - Model-service provider abstraction (Ollama)
//! - RAG: loading, chunking, embedding, caching and exact cosine search
//! - Configuration management
//!
//! ## Primary API
//!
//! Users should interact with quarry through [`RagEngine`].

// Public modules
pub mod config;
pub mod detection;
pub mod provider;
pub mod rag;

// Public exports
pub use config::{Config, ConfigError};
pub use detection::{check_service_silent, detect_service, DetectionError, ServiceInfo};
pub use rag::{EngineState, LoadReport, QueryOutcome, RagEngine, RagError};

// Provider exports
pub use provider::{GenerateRequest, ModelInfo, OllamaProvider, Provider, ProviderError};
