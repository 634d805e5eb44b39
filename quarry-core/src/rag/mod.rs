//! Retrieval Augmented Generation (RAG) over a local document folder.
//!
//! # Overview
//!
//! RAG combines:
//! 1. **Retrieval**: finding the chunks of the document collection closest to a query
//! 2. **Augmentation**: adding those chunks as context to the model prompt
//! 3. **Generation**: the model answers using that context
//!
//! # Architecture
//!
//! - [`RagEngine`]: owns the session and runs the pipeline
//! - [`loader`]: reads `.txt` and `.pdf` files from the document folder
//! - [`chunker`]: splits documents into overlapping character windows
//! - [`Embedder`]: turns text into vectors through the model service
//! - [`EmbeddingCache`]: persists vectors between runs, keyed by a [`Manifest`]
//! - [`search()`]: exact cosine ranking over the in-memory table
//! - [`context`]: assembles ranked chunks into the prompt
//!
//! # How It Works
//!
//! 1. **Loading**: documents are read and chunked (default: 500 characters
//!    with 50 characters of overlap). If the cache on disk was built from the
//!    same documents, parameters and model, its vectors are used; otherwise
//!    every chunk is embedded again and the cache is rewritten.
//! 2. **Querying**: the query is embedded, the top-k chunks are ranked by
//!    cosine similarity, and the generation model answers from them.
//!
//! # State
//!
//! ```text
//! Idle -> Loading -> Embedding -> Ready -> Querying -> Ready
//!                \_____________/^
//!                  (cache hit)
//! ```
//!
//! Known limitation: overlapping neighbour chunks of one document can both
//! appear in the top-k. They are not merged or suppressed.

pub mod cache;
pub mod chunker;
pub mod context;
mod embedder;
pub mod loader;
mod search;
mod types;

pub use cache::{content_hash, CacheError, CacheSnapshot, EmbeddingCache, Manifest};
pub use chunker::{chunk_document, chunk_documents, expected_chunk_count, ChunkError};
pub use context::{build_context, build_prompt, ContextOptions};
pub use embedder::{Embedder, EmbedderError};
pub use loader::{load_documents, LoaderError};
pub use search::{cosine_similarity, search, SearchError};
pub use types::{Chunk, Document, DocumentKind, EmbeddingRecord, SearchResult};

use crate::config::{Config, ConfigError};
use crate::detection::{self, DetectionError};
use crate::provider::{GenerateRequest, Provider, ProviderError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Model service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Model '{0}' not found on the model service")]
    ModelNotFound(String),

    #[error("Embedding failed: {0}")]
    Embedding(EmbedderError),

    #[error("Generation failed: {0}")]
    Generation(ProviderError),

    #[error("Document loading failed: {0}")]
    Loader(#[from] LoaderError),

    #[error("No documents loaded; nothing to search")]
    EmptyCorpus,

    #[error("Query is empty")]
    EmptyQuery,

    #[error("Engine is not ready (state: {0})")]
    NotReady(EngineState),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    fn from_generation(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable { .. } => RagError::ServiceUnavailable(err.to_string()),
            ProviderError::ModelNotFound(model) => RagError::ModelNotFound(model),
            other => RagError::Generation(other),
        }
    }
}

impl From<EmbedderError> for RagError {
    fn from(err: EmbedderError) -> Self {
        match err {
            EmbedderError::Provider(p @ ProviderError::Unavailable { .. }) => {
                RagError::ServiceUnavailable(p.to_string())
            }
            EmbedderError::Provider(ProviderError::ModelNotFound(model)) => {
                RagError::ModelNotFound(model)
            }
            other => RagError::Embedding(other),
        }
    }
}

impl From<DetectionError> for RagError {
    fn from(err: DetectionError) -> Self {
        match err {
            DetectionError::Unavailable(reason) => RagError::ServiceUnavailable(reason),
            DetectionError::ModelNotFound(model) => RagError::ModelNotFound(model),
        }
    }
}

impl From<ConfigError> for RagError {
    fn from(err: ConfigError) -> Self {
        RagError::Configuration(err.to_string())
    }
}

impl From<ChunkError> for RagError {
    fn from(err: ChunkError) -> Self {
        RagError::Configuration(err.to_string())
    }
}

impl From<SearchError> for RagError {
    fn from(err: SearchError) -> Self {
        RagError::Configuration(err.to_string())
    }
}

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Loading,
    Embedding,
    Ready,
    Querying,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Loading => "loading",
            EngineState::Embedding => "embedding",
            EngineState::Ready => "ready",
            EngineState::Querying => "querying",
        };
        f.write_str(name)
    }
}

/// Summary of one document load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub documents: usize,
    pub chunks: usize,
    /// True when the vectors came from the cache file rather than the service.
    pub from_cache: bool,
}

/// Ranked results for a query plus the generated answer.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub results: Vec<SearchResult>,
    pub context: String,
    pub answer: String,
}

/// The retrieval session.
///
/// Owns the loaded documents and the in-memory embedding table. Loading and
/// querying take `&mut self`, so one instance never runs two queries at
/// once. The engine is the only writer of its cache file.
///
/// # Configuration
///
/// The engine uses configuration from [`Config`]:
/// - `rag.embedding_model`: model used for chunk and query vectors
/// - `rag.chunk_size` / `rag.chunk_overlap`: chunking window, in characters
/// - `rag.top_k`: number of ranked results per query
/// - `storage.documents_dir` / `storage.cache_path`: inputs and cache file
/// - `llm.model` / `llm.temperature`: generation settings
pub struct RagEngine {
    config: Config,
    provider: Arc<dyn Provider>,
    embedder: Embedder,
    cache: EmbeddingCache,
    state: EngineState,
    documents: Vec<Document>,
    records: Vec<EmbeddingRecord>,
    manifest: Option<Manifest>,
    last_load: Option<LoadReport>,
}

impl RagEngine {
    /// Creates an idle engine. Nothing is read or embedded until
    /// [`start`](Self::start) or [`reload`](Self::reload).
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use quarry_core::{Config, RagEngine, provider::OllamaProvider};
    /// # use std::sync::Arc;
    /// # async fn example() -> Result<(), quarry_core::rag::RagError> {
    /// let config = Config::default();
    /// let provider = Arc::new(OllamaProvider::new(&config));
    /// let mut engine = RagEngine::new(config, provider)?;
    /// engine.start().await?;
    /// let outcome = engine.query("How do I reset the device?").await?;
    /// println!("{}", outcome.answer);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
        config.validate()?;

        let embedder = Embedder::new(provider.clone(), config.rag.embedding_model.clone());
        let cache = EmbeddingCache::new(config.storage.cache_path.clone());

        Ok(Self {
            config,
            provider,
            embedder,
            cache,
            state: EngineState::Idle,
            documents: Vec::new(),
            records: Vec::new(),
            manifest: None,
            last_load: None,
        })
    }

    /// Verifies the model service, then loads documents and embeddings.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` or `ModelNotFound` when the service cannot be
    /// used; the engine stays `Idle`.
    pub async fn start(&mut self) -> Result<LoadReport> {
        self.start_with(false).await
    }

    /// [`start`](Self::start), optionally re-embedding every chunk even if
    /// the cache is current.
    pub async fn start_with(&mut self, force_refresh: bool) -> Result<LoadReport> {
        detection::detect_service(self.provider.as_ref(), &self.config).await?;
        self.load(force_refresh).await
    }

    /// Re-scans the document folder and re-validates the cache, embedding
    /// everything again only if the documents changed.
    pub async fn reload(&mut self) -> Result<LoadReport> {
        self.load(false).await
    }

    /// Re-scans the document folder and re-embeds every chunk regardless of
    /// the cache.
    pub async fn refresh(&mut self) -> Result<LoadReport> {
        self.load(true).await
    }

    async fn load(&mut self, force_refresh: bool) -> Result<LoadReport> {
        let previous = self.state;
        self.state = EngineState::Loading;

        match self.load_inner(force_refresh).await {
            Ok(report) => {
                self.state = EngineState::Ready;
                self.last_load = Some(report);
                Ok(report)
            }
            Err(e) => {
                // A failed reload keeps serving the previous table.
                self.state = if previous == EngineState::Ready {
                    EngineState::Ready
                } else {
                    EngineState::Idle
                };
                Err(e)
            }
        }
    }

    async fn load_inner(&mut self, force_refresh: bool) -> Result<LoadReport> {
        let rag = &self.config.rag;
        let (chunk_size, overlap) = (rag.chunk_size, rag.chunk_overlap);

        let documents = loader::load_documents(&self.config.storage.documents_dir).await?;
        let chunks = chunker::chunk_documents(&documents, chunk_size, overlap)?;
        info!("Created {} chunks from {} documents", chunks.len(), documents.len());

        let manifest = Manifest::new(&documents, rag.embedding_model.clone(), chunk_size, overlap);

        let cached = if force_refresh {
            info!("Refresh forced, ignoring embedding cache");
            None
        } else {
            self.cached_records(&manifest, &chunks)
        };

        let (records, from_cache) = match cached {
            Some(records) => (records, true),
            None => {
                self.state = EngineState::Embedding;
                let mut embedder = Embedder::new(self.provider.clone(), rag.embedding_model.clone());
                let records = embed_chunks(&mut embedder, chunks).await?;

                if let Err(e) = self.cache.save(&records, &manifest) {
                    warn!("Could not write embedding cache, continuing in memory: {}", e);
                }
                self.embedder = embedder;
                (records, false)
            }
        };

        if from_cache {
            self.embedder.set_dimension(records.first().map(|r| r.vector.len()));
        }

        let report = LoadReport {
            documents: documents.len(),
            chunks: records.len(),
            from_cache,
        };

        self.documents = documents;
        self.records = records;
        self.manifest = Some(manifest);

        info!(
            documents = report.documents,
            chunks = report.chunks,
            from_cache = report.from_cache,
            "Engine ready"
        );
        Ok(report)
    }

    /// Vectors for `chunks` from the cache file, if it is usable and current.
    fn cached_records(&self, manifest: &Manifest, chunks: &[Chunk]) -> Option<Vec<EmbeddingRecord>> {
        let snapshot = match self.cache.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("No embedding cache found at {}", self.cache.path().display());
                return None;
            }
            Err(e) => {
                warn!("Embedding cache unusable, rebuilding: {}", e);
                return None;
            }
        };

        if !self.cache.is_valid(&snapshot, manifest) {
            info!("Embedding cache is stale, rebuilding");
            return None;
        }

        let records: Option<Vec<EmbeddingRecord>> = chunks
            .iter()
            .map(|chunk| {
                snapshot.get(chunk).map(|vector| EmbeddingRecord {
                    metadata: chunk.clone(),
                    vector: vector.to_vec(),
                })
            })
            .collect();

        if records.is_none() {
            warn!("Embedding cache does not cover every chunk, rebuilding");
        }
        records
    }

    /// Ranks the loaded chunks against `query` without generating an answer.
    ///
    /// # Errors
    ///
    /// - `EmptyQuery` for blank input, before any service call
    /// - `EmptyCorpus` when no chunks are loaded, before any service call
    /// - `NotReady` if no load has completed
    /// - embedding failures; the engine stays `Ready`
    pub async fn search(&mut self, query: &str) -> Result<Vec<SearchResult>> {
        let query = self.begin_query(query)?;
        let outcome = self.retrieve(&query).await;
        self.state = EngineState::Ready;
        outcome
    }

    /// Ranks the loaded chunks against `query` and asks the generation model
    /// to answer from them.
    ///
    /// Errors are the same as [`search`](Self::search), plus generation
    /// failures. The engine returns to `Ready` either way.
    pub async fn query(&mut self, query: &str) -> Result<QueryOutcome> {
        let query = self.begin_query(query)?;
        let outcome = self.answer(&query).await;
        self.state = EngineState::Ready;
        outcome
    }

    fn begin_query(&mut self, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if self.state != EngineState::Ready {
            return Err(RagError::NotReady(self.state));
        }
        if self.records.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        self.state = EngineState::Querying;
        Ok(query.to_string())
    }

    async fn retrieve(&mut self, query: &str) -> Result<Vec<SearchResult>> {
        info!("Searching for: '{}'", query);

        let query_embedding = self.embedder.embed(query).await?;
        let results = search::search(&query_embedding, &self.records, self.config.rag.top_k)?;

        for (i, result) in results.iter().enumerate() {
            debug!(
                "Result {}: similarity={:.4}, source={}, offset={}",
                i + 1,
                result.similarity,
                result.metadata.source,
                result.metadata.start_offset
            );
        }
        info!("Found {} relevant chunks", results.len());
        Ok(results)
    }

    async fn answer(&mut self, query: &str) -> Result<QueryOutcome> {
        let results = self.retrieve(query).await?;

        let context = context::build_context(&results, &ContextOptions::from_config(&self.config.rag));
        let prompt = context::build_prompt(query, &context);

        info!("Generating response using {}", self.config.llm.model);
        let request = GenerateRequest::new(self.config.llm.model.clone(), prompt)
            .with_temperature(self.config.llm.temperature);
        let answer = self
            .provider
            .generate(request)
            .await
            .map_err(RagError::from_generation)?;

        Ok(QueryOutcome {
            results,
            context,
            answer,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    /// Number of embedded chunks in the table.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Manifest of the currently loaded table.
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn last_load(&self) -> Option<&LoadReport> {
        self.last_load.as_ref()
    }
}

/// Embeds every chunk in order, one service call at a time.
///
/// Any failure aborts the pass and drops the partial table.
async fn embed_chunks(embedder: &mut Embedder, chunks: Vec<Chunk>) -> Result<Vec<EmbeddingRecord>> {
    info!("Creating embeddings for {} chunks...", chunks.len());
    let total = chunks.len();
    let mut records = Vec::with_capacity(total);

    for (i, chunk) in chunks.into_iter().enumerate() {
        debug!("Processing chunk {}/{} ({} @ {})", i + 1, total, chunk.source, chunk.start_offset);
        let vector = embedder.embed(&chunk.content).await?;
        records.push(EmbeddingRecord {
            metadata: chunk,
            vector,
        });
        if (i + 1) % 100 == 0 {
            info!("Embedded {}/{} chunks", i + 1, total);
        }
    }

    info!("Created {} embeddings", records.len());
    Ok(records)
}
