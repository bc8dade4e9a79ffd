//! PDF text extraction.
//!
//! Concatenates the embedded text of every page in page order. No OCR:
//! pages without a text layer contribute nothing.

use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{debug, warn};

use crate::types::{AppError, AppResult};

pub struct DocumentProcessor;

impl DocumentProcessor {
    /// Extract the text of the PDF at `path` on the blocking thread pool.
    pub async fn extract_text(path: &Path) -> AppResult<String> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_text_blocking(&path))
            .await
            .map_err(|e| AppError::ExtractionFailed(format!("extraction task failed: {}", e)))?
    }

    pub fn extract_text_blocking(path: &Path) -> AppResult<String> {
        let document = Document::load(path).map_err(|e| {
            AppError::ExtractionFailed(format!("could not open {}: {}", path.display(), e))
        })?;
        let text = Self::extract_pages(&document);
        debug!(path = %path.display(), chars = text.len(), "Extracted PDF text");
        Ok(text)
    }

    #[cfg(test)]
    pub(crate) fn extract_text_from_bytes(bytes: &[u8]) -> AppResult<String> {
        let document = Document::load_mem(bytes)
            .map_err(|e| AppError::ExtractionFailed(e.to_string()))?;
        Ok(Self::extract_pages(&document))
    }

    fn extract_pages(document: &Document) -> String {
        let mut text = String::new();
        // get_pages is keyed by page number, so iteration is in page order
        for page_number in document.get_pages().keys() {
            match document.extract_text(&[*page_number]) {
                Ok(page_text) => text.push_str(&page_text),
                Err(e) => {
                    warn!(page = page_number, error = %e, "Page has no extractable text");
                }
            }
        }
        text
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::pdf_with_pages;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pages_concatenated_in_order() {
        let pdf = pdf_with_pages(&[Some("first page"), Some("second page")]);
        let text = DocumentProcessor::extract_text_from_bytes(&pdf).unwrap();

        let first = text.find("first page").expect("first page text");
        let second = text.find("second page").expect("second page text");
        assert!(first < second);
    }

    #[test]
    fn test_page_without_text_contributes_nothing() {
        let pdf = pdf_with_pages(&[None, Some("only text")]);
        let text = DocumentProcessor::extract_text_from_bytes(&pdf).unwrap();
        assert!(text.contains("only text"));
    }

    #[test]
    fn test_corrupt_bytes_fail() {
        let err = DocumentProcessor::extract_text_from_bytes(b"not a pdf").unwrap_err();
        assert!(matches!(err, AppError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn test_extract_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.pdf");
        std::fs::write(&path, pdf_with_pages(&[Some("stored on disk")])).unwrap();

        let text = DocumentProcessor::extract_text(&path).await.unwrap();
        assert!(text.contains("stored on disk"));
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let err = DocumentProcessor::extract_text(Path::new("/nonexistent/doc.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExtractionFailed(_)));
    }
}
