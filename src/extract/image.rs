// piiscan - extract/image.rs
//
// Images produce no text. The extractor returns the opaque handoff marker;
// the processor routes the file to the multimodal engine when that engine
// is enabled and silently skips it otherwise.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::error::ExtractError;
use std::path::Path;

/// Opaque handoff for image files.
pub struct ImageExtractor;

impl TextExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".tiff", ".tif"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &[
            "image/png",
            "image/jpeg",
            "image/gif",
            "image/bmp",
            "image/webp",
            "image/tiff",
        ]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        // Readability is still validated so unreadable images are counted
        // like any other file failure.
        std::fs::metadata(path).map_err(|e| ExtractError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(TextContent::Image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_returns_image_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
        assert!(matches!(
            ImageExtractor.extract(&path).unwrap(),
            TextContent::Image
        ));
    }
}
