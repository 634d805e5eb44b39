//! Prompt assembly from ranked search results.
//!
//! Results go into the context best-first. Nothing is filtered by similarity
//! unless the caller sets a cutoff.

use super::types::SearchResult;

const ENTRY_SEPARATOR: &str = "\n---\n";
const NO_CONTEXT: &str = "No relevant documents found.";

/// Knobs for [`build_context`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextOptions {
    /// Drop results scoring below this.
    pub min_similarity: Option<f32>,
    /// Character budget for the whole context block.
    pub max_chars: Option<usize>,
}

impl ContextOptions {
    pub fn from_config(config: &crate::config::RagConfig) -> Self {
        Self {
            min_similarity: config.min_similarity,
            max_chars: Some(config.max_context_chars),
        }
    }
}

/// Concatenates result chunks with their source attribution, in ranked order.
///
/// Each entry looks like:
///
/// ```text
/// [1] Source: notes.txt (offset 450, similarity 87.12%)
/// <chunk text>
/// ```
///
/// Entries are separated by `---`. With a character budget, entries that
/// would overflow it are left out; a first entry that alone exceeds the
/// budget is cut at a character boundary.
pub fn build_context(results: &[SearchResult], options: &ContextOptions) -> String {
    let mut context = String::new();
    let mut used_chars = 0;
    let mut rank = 0;

    for result in results {
        if options.min_similarity.is_some_and(|min| result.similarity < min) {
            continue;
        }
        rank += 1;

        let entry = format!(
            "[{}] Source: {} (offset {}, similarity {:.2}%)\n{}",
            rank,
            result.metadata.source,
            result.metadata.start_offset,
            result.similarity * 100.0,
            result.metadata.content.trim_end(),
        );
        let separator = if context.is_empty() { "" } else { ENTRY_SEPARATOR };
        let entry_chars = separator.chars().count() + entry.chars().count();

        match options.max_chars {
            Some(budget) if used_chars + entry_chars > budget => {
                if context.is_empty() {
                    context = entry.chars().take(budget).collect();
                }
                break;
            }
            _ => {
                context.push_str(separator);
                context.push_str(&entry);
                used_chars += entry_chars;
            }
        }
    }

    if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context
    }
}

/// Wraps the context and the user's question in the answer template.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on the following context from the document collection, answer the question. \
         If the context does not contain the answer, say so.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        context,
        query.trim()
    )
}
