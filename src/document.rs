//! Source-document loading.
//!
//! The pipeline only needs two things from the corpus: the full extracted
//! text and a little metadata. [`DocumentSource`] keeps that seam narrow so
//! tests can substitute an in-memory document while production reads the
//! Constitution PDF supplied out of band.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::types::RagError;

/// Metadata describing the loaded source document.
#[derive(Clone, Debug, serde::Serialize)]
pub struct DocumentMetadata {
    pub page_count: usize,
    pub title: String,
    pub text_length: usize,
}

/// Supplier of the raw corpus text and its metadata.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Full extracted, cleaned document text.
    async fn load_text(&self) -> Result<String, RagError>;

    /// Document metadata (page count, title, text length).
    async fn metadata(&self) -> Result<DocumentMetadata, RagError>;
}

/// Reads and extracts the Constitution PDF from a fixed path.
///
/// Extraction runs once; `load_text` and `metadata` share the cached result.
pub struct PdfDocumentSource {
    path: PathBuf,
    title: String,
    extracted: tokio::sync::OnceCell<(String, usize)>,
}

impl PdfDocumentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            title: "The Constitution of India".to_string(),
            extracted: tokio::sync::OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn extracted(&self) -> Result<&(String, usize), RagError> {
        self.extracted.get_or_try_init(|| self.extract()).await
    }

    async fn extract(&self) -> Result<(String, usize), RagError> {
        if !self.path.exists() {
            return Err(RagError::Document(format!(
                "source PDF not found at {}; place the document there before ingesting",
                self.path.display()
            )));
        }

        let bytes = tokio::fs::read(&self.path).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "extracting PDF text");

        // pdf-extract is CPU-bound and blocking.
        tokio::task::spawn_blocking(move || {
            let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map_err(|err| RagError::Document(format!("PDF extraction failed: {err}")))?;
            let page_count = pages.len();
            Ok((pages.join("\n"), page_count))
        })
        .await
        .map_err(|err| RagError::Document(format!("extraction task failed: {err}")))?
    }
}

#[async_trait]
impl DocumentSource for PdfDocumentSource {
    async fn load_text(&self) -> Result<String, RagError> {
        let (raw, _) = self.extracted().await?;
        Ok(clean_extracted_text(raw))
    }

    async fn metadata(&self) -> Result<DocumentMetadata, RagError> {
        let (raw, page_count) = self.extracted().await?;
        let text = clean_extracted_text(raw);
        Ok(DocumentMetadata {
            page_count: *page_count,
            title: self.title.clone(),
            text_length: text.chars().count(),
        })
    }
}

fn cleanup_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"\n{3,}").expect("valid pattern"),
            Regex::new(r"[ \t]{2,}").expect("valid pattern"),
            Regex::new(r"(?i)\n\s*Page\s+\d+\s*\n").expect("valid pattern"),
            Regex::new(r"\n\s*-\s*\d+\s*-\s*\n").expect("valid pattern"),
        ]
    })
}

/// Normalizes common PDF extraction artifacts: line-ending folds, excess
/// whitespace, and page-number furniture.
pub fn clean_extracted_text(raw: &str) -> String {
    let [excess_newlines, excess_spaces, page_word, page_dashes] = cleanup_patterns();

    let text = raw.replace("\r\n", "\n");
    let text = page_word.replace_all(&text, "\n");
    let text = page_dashes.replace_all(&text, "\n");
    let text = excess_newlines.replace_all(&text, "\n\n");
    let text = excess_spaces.replace_all(&text, " ");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_folds_line_endings_and_whitespace() {
        let raw = "PART I\r\n\r\n\r\n\r\nThe    Union\t\tand its Territory";
        assert_eq!(clean_extracted_text(raw), "PART I\n\nThe Union and its Territory");
    }

    #[test]
    fn cleanup_strips_page_number_lines() {
        let raw = "clause one\n Page 12 \nclause two\n - 13 - \nclause three";
        let cleaned = clean_extracted_text(raw);
        assert!(!cleaned.contains("Page 12"));
        assert!(!cleaned.contains("- 13 -"));
        assert!(cleaned.contains("clause one"));
        assert!(cleaned.contains("clause three"));
    }

    #[tokio::test]
    async fn missing_pdf_is_a_document_error() {
        let source = PdfDocumentSource::new("/nonexistent/constitution.pdf");
        let err = source.load_text().await.unwrap_err();
        assert!(matches!(err, RagError::Document(_)));
    }
}
