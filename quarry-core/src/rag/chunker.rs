//! Text chunking for RAG.
//!
//! Documents are split into fixed-size character windows that overlap by a
//! configured amount, so text cut at one boundary still appears whole in the
//! neighbouring chunk.

use super::types::{Chunk, Document};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("Invalid chunking configuration: chunk_size={chunk_size}, overlap={overlap} (need 0 < overlap < chunk_size)")]
    InvalidConfiguration { chunk_size: usize, overlap: usize },
}

pub type Result<T> = std::result::Result<T, ChunkError>;

/// Rejects parameters that would not advance the window.
pub fn validate(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 || overlap == 0 || overlap >= chunk_size {
        return Err(ChunkError::InvalidConfiguration { chunk_size, overlap });
    }
    Ok(())
}

/// Number of chunks [`chunk_document`] emits for a document of `len` characters.
pub fn expected_chunk_count(len: usize, chunk_size: usize, overlap: usize) -> usize {
    match len {
        0 => 0,
        n if n <= chunk_size => 1,
        n => (n - overlap).div_ceil(chunk_size - overlap),
    }
}

/// Splits a document into overlapping chunks.
///
/// The window is `chunk_size` characters wide and advances by
/// `chunk_size - overlap`; the last window stops at the end of the content
/// and may be shorter. Start offsets are therefore `0, step, 2*step, ...`.
///
/// # UTF-8 Safety
///
/// Sizes and offsets count `char`s, so a chunk never splits a multi-byte
/// character.
pub fn chunk_document(document: &Document, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    validate(chunk_size, overlap)?;

    let text = document.content.as_str();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    let step = chunk_size - overlap;

    let mut chunks = Vec::with_capacity(expected_chunk_count(char_len, chunk_size, overlap));
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(char_len);
        chunks.push(Chunk {
            source: document.source.clone(),
            content: text[boundaries[start]..boundaries[end]].to_string(),
            start_offset: start,
            kind: document.kind,
        });

        if end == char_len {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Chunks every document in order, concatenating the results.
pub fn chunk_documents(documents: &[Document], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for document in documents {
        chunks.extend(chunk_document(document, chunk_size, overlap)?);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::DocumentKind;

    fn doc(content: &str) -> Document {
        Document::new("doc.txt", content, DocumentKind::Text)
    }

    #[test]
    fn test_chunk_text_small() {
        let chunks = chunk_document(&doc("Hello"), 10, 2).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello");
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn test_chunk_exactly_chunk_size() {
        let chunks = chunk_document(&doc("0123456789"), 10, 2).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunk_text_with_overlap() {
        let chunks = chunk_document(&doc("0123456789ABCDEF"), 10, 2).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "0123456789");
        assert_eq!(chunks[1].content, "89ABCDEF");
        assert_eq!(chunks[1].start_offset, 8);
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        assert!(chunk_document(&doc(""), 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            chunk_document(&doc("abc"), 10, 10),
            Err(ChunkError::InvalidConfiguration { .. })
        ));
        assert!(chunk_document(&doc("abc"), 10, 12).is_err());
        assert!(chunk_document(&doc("abc"), 0, 0).is_err());
        assert!(chunk_document(&doc("abc"), 10, 0).is_err());
    }

    #[test]
    fn test_offsets_and_coverage() {
        let (size, overlap) = (7, 3);
        for len in 1..60 {
            let text: String = (0..len).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
            let chunks = chunk_document(&doc(&text), size, overlap).unwrap();

            assert_eq!(chunks.len(), expected_chunk_count(len, size, overlap), "len={len}");

            let mut covered_to = 0;
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.start_offset, i * (size - overlap));
                assert!(chunk.start_offset <= covered_to, "gap before chunk {i}");
                let end = chunk.start_offset + chunk.content.chars().count();
                let expected: String = text.chars().skip(chunk.start_offset).take(end - chunk.start_offset).collect();
                assert_eq!(chunk.content, expected);
                if i + 1 < chunks.len() {
                    assert_eq!(chunk.content.chars().count(), size);
                }
                covered_to = end;
            }
            assert_eq!(covered_to, len);
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let text = "The quick brown fox jumps over the lazy dog";
        let chunks = chunk_document(&doc(text), 12, 4).unwrap();
        for pair in chunks.windows(2) {
            let tail: String = pair[0].content.chars().skip(12 - 4).collect();
            let head: String = pair[1].content.chars().take(4).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_multibyte_characters() {
        let text = "héllo wörld ünïcödé ✓✓✓";
        let chunks = chunk_document(&doc(text), 5, 1).unwrap();
        assert_eq!(chunks[0].content, "héllo");
        assert_eq!(chunks[1].start_offset, 4);
        assert!(chunks[1].content.starts_with('o'));
        let total = text.chars().count();
        let last = chunks.last().unwrap();
        assert_eq!(last.start_offset + last.content.chars().count(), total);
    }

    #[test]
    fn test_chunk_documents_keeps_source_and_kind() {
        let docs = vec![
            Document::new("a.txt", "aaaaaaaaaaaa", DocumentKind::Text),
            Document::new("b.pdf", "bbb", DocumentKind::Pdf),
        ];
        let chunks = chunk_documents(&docs, 5, 1).unwrap();
        assert_eq!(chunks.len(), 3 + 1);
        assert_eq!(chunks.last().unwrap().source, "b.pdf");
        assert_eq!(chunks.last().unwrap().kind, DocumentKind::Pdf);
    }
}
