// piiscan - extract/mod.rs
//
// Format registry and the text-extractor contract.
//
// The registry maps a file (by extension and, when magic detection is on,
// by content-sniffed MIME type) to exactly one extractor. Resolution order:
//   1. exact extension match
//   2. MIME match
//   3. the plain-text sentinel for anything sniffed as text/*
// Selections are cached per (extension, mime) key.

pub mod archive;
pub mod email;
pub mod html;
pub mod image;
pub mod office;
pub mod pdf;
pub mod rtf;
pub mod sqlite;
pub mod structured;
pub mod text;

use crate::core::model::TextContent;
use crate::util::constants;
use crate::util::error::ExtractError;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

// =============================================================================
// Extractor contract
// =============================================================================

/// One text extractor per supported format.
///
/// Extractors must yield finite output, release any file handle on every
/// exit path, and surface decode failures as `ExtractError` rather than
/// silently skipping the file.
pub trait TextExtractor: Send + Sync {
    /// Stable identifier (used in logs and the archive re-dispatch path).
    fn name(&self) -> &'static str;

    /// Extensions this extractor claims, lower-cased with leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// MIME types this extractor claims for magic detection.
    fn mime_types(&self) -> &'static [&'static str] {
        &[]
    }

    /// Secondary match on a sniffed MIME type. The plain-text sentinel
    /// overrides this to accept anything under `text/`.
    fn accepts_mime(&self, mime: &str) -> bool {
        self.mime_types().contains(&mime)
    }

    /// Turn the file into text (eagerly, chunked, or the image marker).
    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError>;
}

// =============================================================================
// Registry
// =============================================================================

/// Lookup table from file extension / MIME type to an extractor.
pub struct FormatRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,

    /// extension -> index into `extractors`.
    by_extension: HashMap<&'static str, usize>,

    /// Resolution cache: (extension, sniffed mime) -> extractor index.
    cache: Mutex<HashMap<(String, Option<String>), Option<usize>>>,
}

impl FormatRegistry {
    /// Registry over the full built-in extractor set.
    pub fn with_default_extractors() -> Self {
        Self::from_extractors(default_extractors(0))
    }

    /// Registry used for archive member re-dispatch; `depth` bounds how
    /// deep nested archives may recurse.
    pub(crate) fn for_archive_members(depth: usize) -> Self {
        Self::from_extractors(default_extractors(depth))
    }

    fn from_extractors(extractors: Vec<Box<dyn TextExtractor>>) -> Self {
        let mut by_extension = HashMap::new();
        for (idx, extractor) in extractors.iter().enumerate() {
            for ext in extractor.extensions() {
                // First registration wins; duplicate claims would be a
                // programming error in the built-in set.
                by_extension.entry(*ext).or_insert(idx);
            }
        }
        Self {
            extractors,
            by_extension,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Exact extension lookup, no sniffing.
    pub fn by_extension(&self, extension: &str) -> Option<&dyn TextExtractor> {
        self.by_extension
            .get(extension)
            .map(|idx| self.extractors[*idx].as_ref())
    }

    /// Full resolution: extension, then (when `use_magic` is on and the
    /// extension yields nothing) sniffed MIME, then the text/* sentinel.
    ///
    /// Returns the extractor and the sniffed MIME type when sniffing
    /// decided the match.
    pub fn resolve(
        &self,
        extension: &str,
        path: &Path,
        use_magic: bool,
    ) -> Option<(&dyn TextExtractor, Option<String>)> {
        if let Some(extractor) = self.by_extension(extension) {
            return Some((extractor, None));
        }
        if !use_magic {
            return None;
        }

        let mime = sniff_mime(path);
        let cache_key = (extension.to_string(), mime.clone());
        if let Some(cached) = self
            .cache
            .lock()
            .expect("format cache poisoned")
            .get(&cache_key)
        {
            return (*cached).map(|idx| (self.extractors[idx].as_ref(), mime.clone()));
        }

        let resolved = mime.as_deref().and_then(|m| {
            self.extractors
                .iter()
                .position(|e| e.accepts_mime(m))
        });
        self.cache
            .lock()
            .expect("format cache poisoned")
            .insert(cache_key, resolved);

        resolved.map(|idx| (self.extractors[idx].as_ref(), mime))
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("extractors", &self.extractors.len())
            .finish()
    }
}

/// The built-in extractor set, in stable registration order.
fn default_extractors(archive_depth: usize) -> Vec<Box<dyn TextExtractor>> {
    vec![
        Box::new(text::PlainTextExtractor),
        Box::new(structured::CsvExtractor),
        Box::new(structured::JsonExtractor),
        Box::new(structured::XmlExtractor),
        Box::new(structured::YamlExtractor),
        Box::new(html::HtmlExtractor),
        Box::new(rtf::RtfExtractor),
        Box::new(pdf::PdfExtractor),
        Box::new(office::WordExtractor),
        Box::new(office::PresentationExtractor),
        Box::new(office::SpreadsheetExtractor),
        Box::new(office::OpenDocumentExtractor),
        Box::new(email::EmailExtractor),
        Box::new(email::MboxExtractor),
        Box::new(archive::ZipArchiveExtractor::at_depth(archive_depth)),
        Box::new(sqlite::SqliteExtractor),
        Box::new(image::ImageExtractor),
    ]
}

// =============================================================================
// MIME sniffing
// =============================================================================

/// Sniff a MIME type from the first bytes of `path`.
///
/// Binary formats are matched by magic number (`infer`); a buffer that is
/// valid UTF-8 with no NUL bytes falls back to `text/plain` so the
/// sentinel extractor can pick it up.
pub fn sniff_mime(path: &Path) -> Option<String> {
    let mut buf = vec![0u8; constants::SNIFF_BUFFER_SIZE];
    let n = std::fs::File::open(path)
        .and_then(|mut f| f.read(&mut buf))
        .ok()?;
    buf.truncate(n);

    if let Some(kind) = infer::get(&buf) {
        return Some(kind.mime_type().to_string());
    }
    if !buf.is_empty() && !buf.contains(&0) && std::str::from_utf8(&buf).is_ok() {
        return Some("text/plain".to_string());
    }
    None
}

/// Shared helper: read a whole file, mapping I/O failures to `ExtractError`.
pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|e| ExtractError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

// =============================================================================
// Tests
// =============================================================================
