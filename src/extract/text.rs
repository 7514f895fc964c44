// piiscan - extract/text.rs
//
// Plain-text extraction: UTF-8 with replacement characters for invalid
// sequences. Also acts as the sentinel extractor for files whose sniffed
// MIME type begins with text/.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::error::ExtractError;
use std::path::Path;

/// Eager plain-text extractor and the `text/*` sentinel.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".txt", ".text", ".log", ".md", ".markdown"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["text/plain"]
    }

    fn accepts_mime(&self, mime: &str) -> bool {
        mime.starts_with("text/")
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let bytes = super::read_bytes(path)?;
        Ok(TextContent::Text(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reads_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "Anna Müller, u@example.com").unwrap();

        match PlainTextExtractor.extract(&path).unwrap() {
            TextContent::Text(s) => assert_eq!(s, "Anna Müller, u@example.com"),
            other => panic!("expected eager text, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_utf8_replaced_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        fs::write(&path, [b'o', b'k', 0xff, b'!', b' ', b'x']).unwrap();

        match PlainTextExtractor.extract(&path).unwrap() {
            TextContent::Text(s) => {
                assert!(s.starts_with("ok"));
                assert!(s.contains('\u{FFFD}'), "invalid byte becomes U+FFFD");
            }
            other => panic!("expected eager text, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = PlainTextExtractor.extract(Path::new("/nonexistent/piiscan.txt"));
        assert!(matches!(result, Err(ExtractError::Io { .. })));
    }

    #[test]
    fn test_sentinel_accepts_any_text_mime() {
        assert!(PlainTextExtractor.accepts_mime("text/plain"));
        assert!(PlainTextExtractor.accepts_mime("text/x-python"));
        assert!(!PlainTextExtractor.accepts_mime("application/pdf"));
    }
}
