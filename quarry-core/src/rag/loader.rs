//! Document collection from the source folder.
//!
//! The folder is scanned one level deep. Plain-text files are read directly;
//! PDFs go through the `pdftotext` binary from poppler. Every other file is
//! ignored.

use super::types::{Document, DocumentKind};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Errors that can occur while scanning the document folder.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// An I/O error occurred while listing the folder.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for loading operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Maps a file extension to the document kind it is read as.
pub fn document_kind(path: &Path) -> Option<DocumentKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" => Some(DocumentKind::Text),
        "pdf" => Some(DocumentKind::Pdf),
        _ => None,
    }
}

/// Loads every supported document directly inside `dir_path`.
///
/// A missing folder yields an empty corpus. Files that cannot be read are
/// logged and skipped. Documents come back sorted by source name.
pub async fn load_documents(dir_path: &Path) -> Result<Vec<Document>> {
    info!("Loading documents from '{}'", dir_path.display());

    let mut entries = match fs::read_dir(dir_path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Document folder '{}' does not exist", dir_path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut documents = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(kind) = document_kind(&path) else {
            debug!(file = %path.display(), "Ignoring unsupported file");
            continue;
        };
        // `metadata` follows symlinks, so a linked document is read like a plain one.
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                debug!(file = %path.display(), "Ignoring non-file entry");
                continue;
            }
            Err(e) => {
                warn!(file = %path.display(), "Skipping unreadable entry: {}", e);
                continue;
            }
        }
        let source = entry.file_name().to_string_lossy().to_string();

        let content = match kind {
            DocumentKind::Text => read_text(&path).await,
            DocumentKind::Pdf => extract_pdf_text(&path).await,
        };

        match content {
            Ok(content) => {
                if content.trim().is_empty() {
                    warn!(source = %source, "Document has no text content");
                }
                info!(source = %source, kind = %kind, chars = content.chars().count(), "Loaded document");
                documents.push(Document::new(source, content, kind));
            }
            Err(e) => warn!(source = %source, "Skipping unreadable document: {}", e),
        }
    }

    documents.sort_by(|a, b| a.source.cmp(&b.source));
    info!("Total documents loaded: {}", documents.len());
    Ok(documents)
}

async fn read_text(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path).await?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

async fn extract_pdf_text(path: &Path) -> std::io::Result<String> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .await
        .map_err(|e| std::io::Error::new(e.kind(), format!("pdftotext failed to start (is poppler installed?): {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(std::io::Error::other(format!("pdftotext failed: {}", stderr.trim())));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind() {
        assert_eq!(document_kind(Path::new("notes.txt")), Some(DocumentKind::Text));
        assert_eq!(document_kind(Path::new("NOTES.TXT")), Some(DocumentKind::Text));
        assert_eq!(document_kind(Path::new("paper.pdf")), Some(DocumentKind::Pdf));
        assert_eq!(document_kind(Path::new("main.rs")), None);
        assert_eq!(document_kind(Path::new("README")), None);
    }

    #[tokio::test]
    async fn test_load_documents_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "bravo").unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let docs = load_documents(dir.path()).await.unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "b.txt"]);
        assert_eq!(docs[0].content, "alpha");
        assert_eq!(docs[0].kind, DocumentKind::Text);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("latin1.txt"), [b'c', b'a', b'f', 0xE9]).unwrap();

        let docs = load_documents(dir.path()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.starts_with("caf"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_documents_are_loaded() {
        let outside = tempfile::tempdir().unwrap();
        let real = outside.path().join("real.txt");
        std::fs::write(&real, "linked content").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("linked.txt")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone.txt"), dir.path().join("dangling.txt")).unwrap();

        let docs = load_documents(dir.path()).await.unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "linked.txt"]);
        assert_eq!(docs[1].content, "linked content");
    }

    #[tokio::test]
    async fn test_unreadable_pdf_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain text").unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf").unwrap();

        let docs = load_documents(dir.path()).await.unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn test_missing_folder_is_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let docs = load_documents(&dir.path().join("missing")).await.unwrap();
        assert!(docs.is_empty());
    }
}
