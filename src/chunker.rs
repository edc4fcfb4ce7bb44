//! Overlap-based text chunking that tries to preserve article and section
//! boundaries in the source document.
//!
//! The walk proposes a cut every `target_size` characters, then searches a
//! ±200-character window around the proposal for the best natural break
//! (paragraph break first, then sentence ends, then a bare newline). Advancing
//! by at least 100 characters per step guarantees termination regardless of
//! the overlap setting.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::RagError;

/// Target characters per chunk (~500 tokens).
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
/// Characters shared between consecutive chunks to keep context.
pub const DEFAULT_OVERLAP: usize = 200;

/// How far around the proposed cut the boundary search may look.
const BOUNDARY_WINDOW: usize = 200;
/// Minimum forward progress per emitted chunk.
const MIN_ADVANCE: usize = 100;
/// Upper bound on detected topic tags per chunk.
const MAX_TOPIC_TAGS: usize = 5;

/// Tag applied when no article/part/schedule reference is detected.
pub const GENERAL_TAG: &str = "General";

/// A bounded slice of the source document, the atomic unit of knowledge.
///
/// Offsets are character offsets into the full document text and always
/// satisfy `end_offset > start_offset`. Instances are immutable once emitted.
#[derive(Clone, Debug, PartialEq)]
pub struct TextChunk {
    /// Stable id derived from the sequence index (`chunk-{index}`).
    pub id: String,
    /// Chunk body, trimmed of surrounding whitespace.
    pub text: String,
    /// Zero-based sequence position.
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Detected section labels in order of first appearance, falling back to
    /// [`GENERAL_TAG`] when nothing matched.
    pub topic_tags: Vec<String>,
}

impl TextChunk {
    /// Tags joined the way the store and citation layers consume them.
    pub fn joined_tags(&self) -> String {
        self.topic_tags.join(", ")
    }
}

fn topic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)Article\s+\d+[A-Z]?\.?|PART\s+[IVXLCDM]+|SCHEDULE")
            .expect("topic tag pattern is valid")
    })
}

/// Chunks `text` with the default size and overlap.
pub fn chunk_text(text: &str) -> Result<Vec<TextChunk>, RagError> {
    chunk_text_with(text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
}

/// Chunks `text` into overlapping, boundary-aware segments.
///
/// `overlap >= target_size` is accepted; the fixed minimum advance still
/// guarantees forward progress. A `target_size` of zero is a caller bug and
/// fails with [`RagError::Configuration`].
pub fn chunk_text_with(
    text: &str,
    target_size: usize,
    overlap: usize,
) -> Result<Vec<TextChunk>, RagError> {
    if target_size == 0 {
        return Err(RagError::Configuration(
            "chunk target_size must be greater than zero".into(),
        ));
    }

    // Operate on a char vector so boundary math can never split a code point
    // and offsets stay character-based.
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut position = 0usize;
    let mut index = 0usize;

    while position < total {
        let mut end = (position + target_size).min(total);

        if end < total {
            end = adjust_to_boundary(&chars, end, total);
        }

        // With a small target size the boundary window can reach behind
        // `position`; such a cut yields nothing, but the walk still advances.
        if end > position {
            let slice: String = chars[position..end].iter().collect();
            let trimmed = slice.trim();

            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    id: format!("chunk-{index}"),
                    text: trimmed.to_string(),
                    index,
                    start_offset: position,
                    end_offset: end,
                    topic_tags: detect_topic_tags(trimmed),
                });
                index += 1;
            }
        }

        position = (position + MIN_ADVANCE).max(end.saturating_sub(overlap));
    }

    Ok(chunks)
}

/// Moves a proposed cut to just after the nearest natural break inside the
/// search window. Break patterns are tried in priority order; the first one
/// present wins, at its last occurrence in the window.
fn adjust_to_boundary(chars: &[char], proposed: usize, total: usize) -> usize {
    let window_start = proposed.saturating_sub(BOUNDARY_WINDOW);
    let window_end = (proposed + BOUNDARY_WINDOW).min(total);
    let window = &chars[window_start..window_end];

    const BREAKS: [&[char]; 4] = [&['\n', '\n'], &['.', '\n'], &['.', ' '], &['\n']];

    for pattern in BREAKS {
        if let Some(at) = rfind_chars(window, pattern) {
            if at > 0 {
                return window_start + at + 1;
            }
        }
    }
    proposed
}

/// Last occurrence of `pattern` in `haystack`, as a char index.
fn rfind_chars(haystack: &[char], pattern: &[char]) -> Option<usize> {
    if pattern.is_empty() || haystack.len() < pattern.len() {
        return None;
    }
    (0..=haystack.len() - pattern.len()).rev().find(|&start| {
        haystack[start..start + pattern.len()] == *pattern
    })
}

/// Detects up to five unique article/part/schedule references, in order of
/// first appearance.
fn detect_topic_tags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for found in topic_pattern().find_iter(text) {
        let label = found.as_str().to_string();
        if !tags.contains(&label) {
            tags.push(label);
            if tags.len() == MAX_TOPIC_TAGS {
                break;
            }
        }
    }
    if tags.is_empty() {
        tags.push(GENERAL_TAG.to_string());
    }
    tags
}
