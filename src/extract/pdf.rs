// piiscan - extract/pdf.rs
//
// PDF text extraction, chunked per page. Page boundaries are natural
// document units; an entity split across a page boundary is not
// reassembled.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::error::ExtractError;
use std::path::Path;

/// Page-chunked PDF extractor.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".pdf"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/pdf"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| {
            ExtractError::Decode {
                path: path.to_path_buf(),
                format: "pdf",
                reason: e.to_string(),
            }
        })?;

        tracing::debug!(path = %path.display(), pages = pages.len(), "PDF decoded");
        Ok(TextContent::Chunks(Box::new(pages.into_iter().map(Ok))))
    }
}
