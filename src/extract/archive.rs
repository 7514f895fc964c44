// piiscan - extract/archive.rs
//
// ZIP archive extraction: each member is staged to a temporary file and
// re-dispatched through the format registry, so a .zip of .docx and .csv
// files is scanned like a directory of them. Nested archives recurse up
// to MAX_ARCHIVE_DEPTH; members without a matching extractor are skipped.

use super::{FormatRegistry, TextExtractor};
use crate::core::model::TextContent;
use crate::util::constants;
use crate::util::error::ExtractError;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Recursive ZIP extractor; one chunk per member.
pub struct ZipArchiveExtractor {
    depth: usize,
}

impl ZipArchiveExtractor {
    /// Extractor operating at the given nesting depth (0 = top level).
    pub(crate) fn at_depth(depth: usize) -> Self {
        Self { depth }
    }
}

impl TextExtractor for ZipArchiveExtractor {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zip"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/zip"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let file = File::open(path).map_err(|e| ExtractError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let archive = ZipArchive::new(file).map_err(|e| ExtractError::Zip {
            path: path.to_path_buf(),
            source: e,
        })?;

        let member_count = archive.len().min(constants::MAX_ARCHIVE_MEMBERS);
        if archive.len() > member_count {
            tracing::warn!(
                path = %path.display(),
                members = archive.len(),
                limit = member_count,
                "Archive member limit reached; remaining members skipped"
            );
        }

        Ok(TextContent::Chunks(Box::new(ArchiveChunks {
            archive,
            path: path.to_path_buf(),
            member_count,
            next: 0,
            registry: FormatRegistry::for_archive_members(self.depth + 1),
            depth: self.depth,
        })))
    }
}

/// Lazy per-member chunk sequence over a ZIP archive.
struct ArchiveChunks {
    archive: ZipArchive<File>,
    path: PathBuf,
    member_count: usize,
    next: usize,
    registry: FormatRegistry,
    depth: usize,
}

impl Iterator for ArchiveChunks {
    type Item = Result<String, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.member_count {
            let index = self.next;
            self.next += 1;
            match self.dispatch_member(index) {
                Ok(Some(text)) => return Some(Ok(text)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

impl ArchiveChunks {
    /// Extract one member; `None` when the member has no matching
    /// extractor (or is a directory / a too-deep nested archive).
    fn dispatch_member(&mut self, index: usize) -> Result<Option<String>, ExtractError> {
        let (member_name, bytes) = {
            let mut entry = self.archive.by_index(index).map_err(|e| ExtractError::Zip {
                path: self.path.clone(),
                source: e,
            })?;
            if entry.is_dir() {
                return Ok(None);
            }
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).map_err(|e| ExtractError::Io {
                path: self.path.clone(),
                source: e,
            })?;
            (entry.name().to_string(), buf)
        };

        let extension = Path::new(&member_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        if extension == ".zip" && self.depth + 1 >= constants::MAX_ARCHIVE_DEPTH {
            tracing::debug!(
                archive = %self.path.display(),
                member = member_name,
                "Nested archive beyond depth limit skipped"
            );
            return Ok(None);
        }
        let Some(extractor) = self.registry.by_extension(&extension) else {
            tracing::debug!(
                archive = %self.path.display(),
                member = member_name,
                "No extractor for archive member, skipped"
            );
            return Ok(None);
        };

        // Stage the member to a temporary file so extractors that need
        // random access (ZIP-in-ZIP, SQLite) work unchanged. The file is
        // removed when `staged` drops, after the chunk is fully drained.
        let mut staged = tempfile::Builder::new()
            .prefix("piiscan-member-")
            .suffix(&extension)
            .tempfile()
            .and_then(|mut f| f.write_all(&bytes).map(|()| f))
            .map_err(|e| ExtractError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        staged.flush().map_err(|e| ExtractError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        let text = match extractor.extract(staged.path())? {
            TextContent::Text(s) => s,
            TextContent::Chunks(chunks) => {
                let mut combined = String::new();
                for chunk in chunks.take(constants::MAX_CHUNKS_PER_FILE) {
                    combined.push_str(&chunk?);
                    combined.push('\n');
                }
                combined
            }
            // Images inside archives are not routed to the multimodal
            // engine; only top-level files are.
            TextContent::Image => return Ok(None),
        };
        Ok(Some(text))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in members {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_members_redispatched_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        build_zip(
            &path,
            &[
                ("readme.txt", b"Contact u@example.com".as_slice()),
                ("data.csv", b"Anna,DE89370400440532013000".as_slice()),
                ("binary.blob", b"\x00\x01\x02".as_slice()),
            ],
        );

        match ZipArchiveExtractor::at_depth(0).extract(&path).unwrap() {
            TextContent::Chunks(chunks) => {
                let texts: Vec<String> = chunks.map(|c| c.unwrap()).collect();
                assert_eq!(texts.len(), 2, "blob member has no extractor");
                assert!(texts.iter().any(|t| t.contains("u@example.com")));
                assert!(texts.iter().any(|t| t.contains("DE89370400440532013000")));
            }
            other => panic!("expected chunks, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_archive_is_recursed() {
        let dir = tempfile::tempdir().unwrap();
        let inner_path = dir.path().join("inner.zip");
        build_zip(&inner_path, &[("deep.txt", b"nested u@example.com".as_slice())]);
        let inner_bytes = std::fs::read(&inner_path).unwrap();

        let outer_path = dir.path().join("outer.zip");
        build_zip(&outer_path, &[("inner.zip", inner_bytes.as_slice())]);

        match ZipArchiveExtractor::at_depth(0).extract(&outer_path).unwrap() {
            TextContent::Chunks(chunks) => {
                let texts: Vec<String> = chunks.map(|c| c.unwrap()).collect();
                assert_eq!(texts.len(), 1);
                assert!(texts[0].contains("nested u@example.com"));
            }
            other => panic!("expected chunks, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_archive_is_zip_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, "definitely not a zip").unwrap();
        assert!(matches!(
            ZipArchiveExtractor::at_depth(0).extract(&path),
            Err(ExtractError::Zip { .. })
        ));
    }
}
