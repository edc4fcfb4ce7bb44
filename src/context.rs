//! Turns ranked retrieval results into the context block fed to generation
//! and the citation summary returned out of band.

use crate::stores::RetrievalResult;

/// Separator between numbered source sections in the context block.
const SECTION_SEPARATOR: &str = "\n\n---\n\n";
/// Delimiter between deduplicated citation strings.
const CITATION_DELIMITER: &str = " | ";

/// Assembled grounding material for one ask request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PromptContext {
    /// Numbered, tagged source sections in retrieval order.
    pub context_block: String,
    /// Order-preserving deduplicated tag strings, newline-free so the value
    /// is safe as a single opaque header.
    pub citation_summary: String,
}

/// Formats results into a context block and citation summary, preserving the
/// input order (already ranked by the store). Empty input yields empty
/// outputs; the orchestrator treats that as a distinct no-knowledge condition
/// before ever calling this.
pub fn assemble(results: &[RetrievalResult]) -> PromptContext {
    let context_block = results
        .iter()
        .enumerate()
        .map(|(i, result)| format!("[Source {} — {}]\n{}", i + 1, result.topic_tags, result.text))
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);

    let mut seen: Vec<&str> = Vec::new();
    for result in results {
        if !seen.contains(&result.topic_tags.as_str()) {
            seen.push(&result.topic_tags);
        }
    }
    let citation_summary = seen
        .join(CITATION_DELIMITER)
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string();

    PromptContext {
        context_block,
        citation_summary,
    }
}
