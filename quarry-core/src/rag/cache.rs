//! On-disk embedding cache.
//!
//! The cache is a single bincode file holding every [`EmbeddingRecord`] from
//! the last full embedding pass together with the [`Manifest`] that describes
//! the inputs of that pass. A cache is only reused when its manifest equals
//! the manifest of the documents currently on disk; otherwise everything is
//! re-embedded. There is no per-document incremental refresh.
//!
//! Writes go to a temporary file in the destination directory that is then
//! renamed over the target, so an interrupted write never leaves a torn file.

use super::types::{Chunk, Document, EmbeddingRecord};
use bincode::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

const MAGIC: [u8; 4] = *b"QRYC";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache file is corrupt: {0}")]
    Corrupt(String),

    #[error("Cache format version {found} is not supported")]
    Incompatible { found: u32 },

    #[error("Refusing to write mixed embedding dimensions: {expected} and {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// The inputs a cache was built from.
///
/// Two manifests are equal when they name the same embedding model, the same
/// chunking parameters and exactly the same sources with the same content
/// hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Source identifier to SHA-256 hex digest of its content.
    pub sources: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new(
        documents: &[Document],
        embedding_model: impl Into<String>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        let sources = documents
            .iter()
            .map(|d| (d.source.clone(), content_hash(&d.content)))
            .collect();
        Self {
            embedding_model: embedding_model.into(),
            chunk_size,
            chunk_overlap,
            sources,
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn contains_source(&self, source: &str) -> bool {
        self.sources.contains_key(source)
    }
}

/// SHA-256 of the text, hex encoded.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Common length of all vectors, `None` for an empty set.
pub fn common_dimension(records: &[EmbeddingRecord]) -> Result<Option<usize>> {
    let mut dimension = None;
    for record in records {
        match dimension {
            None => dimension = Some(record.vector.len()),
            Some(expected) if expected != record.vector.len() => {
                return Err(CacheError::DimensionMismatch {
                    expected,
                    actual: record.vector.len(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(dimension)
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    magic: [u8; 4],
    version: u32,
    manifest: Manifest,
    records: Vec<EmbeddingRecord>,
}

/// A cache read back from disk and checked for internal consistency.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    manifest: Manifest,
    records: Vec<EmbeddingRecord>,
    dimension: Option<usize>,
    index: HashMap<(String, usize), usize>,
}

impl CacheSnapshot {
    fn new(manifest: Manifest, records: Vec<EmbeddingRecord>) -> Result<Self> {
        let dimension = common_dimension(&records)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        if dimension == Some(0) {
            return Err(CacheError::Corrupt("zero-length vectors".to_string()));
        }

        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let chunk = &record.metadata;
            if !manifest.contains_source(&chunk.source) {
                return Err(CacheError::Corrupt(format!(
                    "record for '{}' is not listed in the manifest",
                    chunk.source
                )));
            }
            index.insert((chunk.source.clone(), chunk.start_offset), i);
        }

        Ok(Self {
            manifest,
            records,
            dimension,
            index,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The cached vector for `chunk`, if the same text was embedded at the
    /// same position of the same source.
    pub fn get(&self, chunk: &Chunk) -> Option<&[f32]> {
        let i = *self.index.get(&(chunk.source.clone(), chunk.start_offset))?;
        let record = &self.records[i];
        (record.metadata.content == chunk.content).then_some(record.vector.as_slice())
    }
}

/// Reads, validates and atomically writes the cache file.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    path: PathBuf,
}

impl EmbeddingCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cache file.
    ///
    /// Returns `Ok(None)` when there is no file. A file that cannot be
    /// decoded, carries another format version, or holds vectors of mixed
    /// length is an error; callers treat it as a miss.
    pub fn load(&self) -> Result<Option<CacheSnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cache file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file: CacheFile = codec()
            .with_limit(bytes.len() as u64)
            .deserialize(&bytes)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;

        if file.magic != MAGIC {
            return Err(CacheError::Corrupt("bad magic".to_string()));
        }
        if file.version != FORMAT_VERSION {
            return Err(CacheError::Incompatible { found: file.version });
        }

        let snapshot = CacheSnapshot::new(file.manifest, file.records)?;
        info!(
            path = %self.path.display(),
            records = snapshot.len(),
            sources = snapshot.manifest().source_count(),
            "Loaded embeddings from cache"
        );
        Ok(Some(snapshot))
    }

    /// Whether `snapshot` was built from exactly the inputs in `current`.
    pub fn is_valid(&self, snapshot: &CacheSnapshot, current: &Manifest) -> bool {
        snapshot.manifest() == current
    }

    /// Writes `records` and `manifest`, replacing any previous cache.
    pub fn save(&self, records: &[EmbeddingRecord], manifest: &Manifest) -> Result<()> {
        common_dimension(records)?;

        let file = CacheFile {
            magic: MAGIC,
            version: FORMAT_VERSION,
            manifest: manifest.clone(),
            records: records.to_vec(),
        };
        let bytes = codec().serialize(&file)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Dropped without persisting on any error, which deletes it.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(
            path = %self.path.display(),
            records = records.len(),
            bytes = bytes.len(),
            "Embeddings cached"
        );
        Ok(())
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::DocumentKind;
    use tempfile::TempDir;

    fn chunk(source: &str, content: &str, start_offset: usize) -> Chunk {
        Chunk {
            source: source.to_string(),
            content: content.to_string(),
            start_offset,
            kind: DocumentKind::Text,
        }
    }

    fn sample() -> (Vec<EmbeddingRecord>, Manifest) {
        let docs = vec![
            Document::new("a.txt", "alpha beta", DocumentKind::Text),
            Document::new("b.txt", "gamma", DocumentKind::Text),
        ];
        let manifest = Manifest::new(&docs, "gemma", 8, 2);
        let records = vec![
            EmbeddingRecord { metadata: chunk("a.txt", "alpha be", 0), vector: vec![0.1, 0.2, 0.3] },
            EmbeddingRecord { metadata: chunk("a.txt", "beta", 6), vector: vec![0.4, 0.5, 0.6] },
            EmbeddingRecord { metadata: chunk("b.txt", "gamma", 0), vector: vec![-1.0, 0.0, 2.5] },
        ];
        (records, manifest)
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("nested/cache.bin"));
        let (records, manifest) = sample();

        cache.save(&records, &manifest).unwrap();
        let snapshot = cache.load().unwrap().expect("cache present");

        assert_eq!(snapshot.records(), records.as_slice());
        assert_eq!(snapshot.dimension(), Some(3));
        assert!(cache.is_valid(&snapshot, &manifest));
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("cache.bin"));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.bin");
        let cache = EmbeddingCache::new(&path);
        let (records, manifest) = sample();
        cache.save(&records, &manifest).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(cache.load(), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.bin");
        fs::write(&path, b"definitely not a cache").unwrap();
        assert!(EmbeddingCache::new(&path).load().is_err());
    }

    #[test]
    fn test_other_version_is_incompatible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.bin");
        let (records, manifest) = sample();
        let file = CacheFile { magic: MAGIC, version: FORMAT_VERSION + 1, manifest, records };
        fs::write(&path, codec().serialize(&file).unwrap()).unwrap();

        assert!(matches!(
            EmbeddingCache::new(&path).load(),
            Err(CacheError::Incompatible { found }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn test_mixed_dimensions_on_disk_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.bin");
        let (mut records, manifest) = sample();
        records[1].vector.push(9.0);
        let file = CacheFile { magic: MAGIC, version: FORMAT_VERSION, manifest, records };
        fs::write(&path, codec().serialize(&file).unwrap()).unwrap();

        assert!(matches!(EmbeddingCache::new(&path).load(), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_save_rejects_mixed_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.bin");
        let cache = EmbeddingCache::new(&path);
        let (mut records, manifest) = sample();
        records[2].vector.truncate(1);

        assert!(matches!(
            cache.save(&records, &manifest),
            Err(CacheError::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0, "no stray temp file");
    }

    #[test]
    fn test_changed_content_invalidates() {
        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("cache.bin"));
        let (records, manifest) = sample();
        cache.save(&records, &manifest).unwrap();
        let snapshot = cache.load().unwrap().unwrap();

        let edited = vec![
            Document::new("a.txt", "alpha beta!", DocumentKind::Text),
            Document::new("b.txt", "gamma", DocumentKind::Text),
        ];
        assert!(!cache.is_valid(&snapshot, &Manifest::new(&edited, "gemma", 8, 2)));
    }

    #[test]
    fn test_changed_sources_or_parameters_invalidate() {
        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("cache.bin"));
        let (records, manifest) = sample();
        cache.save(&records, &manifest).unwrap();
        let snapshot = cache.load().unwrap().unwrap();

        let docs = vec![
            Document::new("a.txt", "alpha beta", DocumentKind::Text),
            Document::new("b.txt", "gamma", DocumentKind::Text),
        ];
        assert!(cache.is_valid(&snapshot, &Manifest::new(&docs, "gemma", 8, 2)));
        assert!(!cache.is_valid(&snapshot, &Manifest::new(&docs, "gemma", 9, 2)));
        assert!(!cache.is_valid(&snapshot, &Manifest::new(&docs, "gemma", 8, 3)));
        assert!(!cache.is_valid(&snapshot, &Manifest::new(&docs, "nomic-embed-text", 8, 2)));
        assert!(!cache.is_valid(&snapshot, &Manifest::new(&docs[..1], "gemma", 8, 2)));
    }

    #[test]
    fn test_get_matches_position_and_content() {
        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("cache.bin"));
        let (records, manifest) = sample();
        cache.save(&records, &manifest).unwrap();
        let snapshot = cache.load().unwrap().unwrap();

        assert_eq!(snapshot.get(&chunk("a.txt", "beta", 6)), Some(&[0.4, 0.5, 0.6][..]));
        assert_eq!(snapshot.get(&chunk("a.txt", "BETA", 6)), None);
        assert_eq!(snapshot.get(&chunk("a.txt", "beta", 7)), None);
        assert_eq!(snapshot.get(&chunk("c.txt", "beta", 6)), None);
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("cache.bin"));
        let (records, manifest) = sample();
        cache.save(&records, &manifest).unwrap();
        cache.save(&records[..1], &manifest).unwrap();

        assert_eq!(cache.load().unwrap().unwrap().len(), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
