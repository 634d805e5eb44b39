use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the retrieval engine and the model service it talks to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Configuration for the generation model.
///
/// The temperature is fixed here and sent with every generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    #[serde(default = "default_generate_timeout")]
    pub timeout_secs: u64,
}

/// Configuration for embedding, chunking and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub embedding_model: String,
    /// Chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Results scoring below this are left out of the prompt. `None` keeps every result.
    #[serde(default)]
    pub min_similarity: Option<f32>,
    /// Upper bound on the context block handed to the generation model
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_secs: u64,
}

/// Where documents are read from and where the embedding cache lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub documents_dir: PathBuf,
    pub cache_path: PathBuf,
}

fn default_top_k() -> usize {
    5
}

fn default_max_context_chars() -> usize {
    6000
}

fn default_embed_timeout() -> u64 {
    30
}

fn default_generate_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemma".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.7,
            timeout_secs: default_generate_timeout(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: "gemma".to_string(),
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: default_top_k(),
            min_similarity: None,
            max_context_chars: default_max_context_chars(),
            embed_timeout_secs: default_embed_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("documents"),
            cache_path: PathBuf::from("embeddings/embeddings_cache.bin"),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RagConfig {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path` if the file exists, otherwise use defaults.
    ///
    /// A file that exists but cannot be parsed or fails validation is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Checks the cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let rag = &self.rag;
        if rag.chunk_size == 0 || rag.chunk_overlap == 0 {
            return Err(ConfigError::Invalid(format!(
                "chunk_size ({}) and chunk_overlap ({}) must be positive",
                rag.chunk_size, rag.chunk_overlap
            )));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if rag.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if rag.max_context_chars == 0 {
            return Err(ConfigError::Invalid("max_context_chars must be at least 1".to_string()));
        }
        if self.llm.timeout_secs == 0 || rag.embed_timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "timeout_secs ({}) and embed_timeout_secs ({}) must be positive",
                self.llm.timeout_secs, rag.embed_timeout_secs
            )));
        }
        if let Some(min) = rag.min_similarity {
            if !(-1.0..=1.0).contains(&min) {
                return Err(ConfigError::Invalid(format!(
                    "min_similarity ({}) must lie in [-1, 1]",
                    min
                )));
            }
        }
        if !self.llm.temperature.is_finite() || !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature ({}) must lie in [0, 2]",
                self.llm.temperature
            )));
        }
        if rag.embedding_model.trim().is_empty() || self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model names must not be empty".to_string()));
        }
        Ok(())
    }
}
