// piiscan - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation; all errors keep the causal chain
// for diagnostic logging. Per-file failures carry an `ErrorKind` tag so
// statistics can bucket them without holding the full error.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;

// =============================================================================
// Error kinds (statistics tags)
// =============================================================================

/// Classification of a recoverable per-file or per-engine failure.
///
/// These tags feed the error histogram in `core::stats`; the full error
/// value is logged at the failure site and then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Canonicalised file path escapes the scan root.
    PathTraversal,

    /// The OS denied read access.
    PermissionDenied,

    /// File size exceeds the configured ceiling.
    FileTooLarge,

    /// No extractor matches the file's extension or sniffed MIME type.
    UnsupportedFormat,

    /// The extractor could not decode the file.
    Extraction,

    /// An engine's `detect` failed or returned malformed output.
    Engine,

    /// An engine failed its readiness check at startup.
    EngineUnavailable,

    /// The output writer could not be opened or flushed.
    Writer,
}

impl ErrorKind {
    /// Human-readable label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PathTraversal => "path_traversal",
            Self::PermissionDenied => "permission_denied",
            Self::FileTooLarge => "file_too_large",
            Self::UnsupportedFormat => "unsupported_format",
            Self::Extraction => "extraction",
            Self::Engine => "engine",
            Self::EngineUnavailable => "engine_unavailable",
            Self::Writer => "writer",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Top-level error
// =============================================================================

/// Top-level error type for all piiscan operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum PiiScanError {
    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// The scan root could not be opened.
    Scan(ScanError),

    /// Text extraction failed (fatal contexts only; per-file extraction
    /// failures are counted, not propagated).
    Extract(ExtractError),

    /// A detection engine failed (fatal contexts only).
    Engine(EngineError),

    /// Output writing failed.
    Writer(WriterError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl PiiScanError {
    /// Process exit code for this error, per the documented CLI contract:
    /// 1 general/writer, 3 file access on the root, 4 configuration.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 4,
            Self::Engine(EngineError::Unavailable { .. }) => 4,
            Self::Scan(_) => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for PiiScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Scan(e) => write!(f, "Scan error: {e}"),
            Self::Extract(e) => write!(f, "Extraction error: {e}"),
            Self::Engine(e) => write!(f, "Engine error: {e}"),
            Self::Writer(e) => write!(f, "Writer error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for PiiScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Scan(e) => Some(e),
            Self::Extract(e) => Some(e),
            Self::Engine(e) => Some(e),
            Self::Writer(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors related to configuration, pattern-file, and whitelist loading.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be parsed as YAML or JSON.
    FileParse { path: PathBuf, reason: String },

    /// Pattern JSON could not be parsed.
    PatternParse {
        source_name: String,
        source: serde_json::Error,
    },

    /// A regex expression in the pattern file is invalid.
    InvalidPattern {
        label: String,
        pattern: String,
        source: regex::Error,
    },

    /// A regex expression exceeds the maximum allowed length.
    PatternTooLong {
        label: String,
        length: usize,
        max_length: usize,
    },

    /// The stored group position of a pattern entry does not match the
    /// position computed from the combined alternation.
    GroupPositionMismatch {
        label: String,
        stored: usize,
        computed: usize,
    },

    /// The whitelist file could not be read.
    WhitelistIo { path: PathBuf, source: io::Error },

    /// Too many whitelist entries.
    WhitelistTooLarge { count: usize, max: usize },

    /// The compiled whitelist alternation is invalid.
    InvalidWhitelist { source: regex::Error },

    /// No detection engine is enabled (or none survived availability checks).
    NoEngines,

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading a configuration input.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileParse { path, reason } => {
                write!(f, "Failed to parse config '{}': {reason}", path.display())
            }
            Self::PatternParse {
                source_name,
                source,
            } => write!(f, "Failed to parse pattern file '{source_name}': {source}"),
            Self::InvalidPattern {
                label,
                pattern,
                source,
            } => write!(
                f,
                "Pattern '{label}': invalid regex ('{pattern}'): {source}"
            ),
            Self::PatternTooLong {
                label,
                length,
                max_length,
            } => write!(
                f,
                "Pattern '{label}' is {length} chars, exceeds maximum of {max_length}"
            ),
            Self::GroupPositionMismatch {
                label,
                stored,
                computed,
            } => write!(
                f,
                "Pattern '{label}': declared group position {stored} does not \
                 match computed position {computed}"
            ),
            Self::WhitelistIo { path, source } => {
                write!(
                    f,
                    "Failed to read whitelist '{}': {source}",
                    path.display()
                )
            }
            Self::WhitelistTooLarge { count, max } => {
                write!(f, "Whitelist has {count} entries, maximum is {max}")
            }
            Self::InvalidWhitelist { source } => {
                write!(f, "Whitelist pattern failed to compile: {source}")
            }
            Self::NoEngines => write!(
                f,
                "No detection engine enabled. Enable at least one of \
                 --regex / --ner / --spacy-ner / --ollama / --openai-compatible"
            ),
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PatternParse { source, .. } => Some(source),
            Self::InvalidPattern { source, .. } => Some(source),
            Self::InvalidWhitelist { source } => Some(source),
            Self::WhitelistIo { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for PiiScanError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Scan errors (fatal root failures; per-file failures are ErrorKind counts)
// ---------------------------------------------------------------------------

/// Errors that invalidate the traversal as a whole.
#[derive(Debug)]
pub enum ScanError {
    /// The scan root does not exist.
    RootNotFound { path: PathBuf },

    /// The scan root is not a directory.
    NotADirectory { path: PathBuf },

    /// The scan root could not be opened or canonicalised.
    RootUnreadable { path: PathBuf, source: io::Error },
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Scan path '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "Scan path '{}' is not a directory", path.display())
            }
            Self::RootUnreadable { path, source } => {
                write!(f, "Cannot open scan root '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RootUnreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ScanError> for PiiScanError {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}

// ---------------------------------------------------------------------------
// Extraction errors
// ---------------------------------------------------------------------------

/// Errors surfaced by text extractors. Always scoped to one file (or one
/// archive member) and therefore recoverable at the scan level.
#[derive(Debug)]
pub enum ExtractError {
    /// I/O error reading the source file.
    Io { path: PathBuf, source: io::Error },

    /// The file could not be decoded as its declared format.
    Decode {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    /// A ZIP container (archive, OOXML, ODF) is corrupt.
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// A SQLite database could not be opened or queried.
    Sqlite {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

impl ExtractError {
    /// Path of the file the error is attached to.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Io { path, .. }
            | Self::Decode { path, .. }
            | Self::Zip { path, .. }
            | Self::Sqlite { path, .. } => path,
        }
    }
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "'{}': I/O error: {source}", path.display())
            }
            Self::Decode {
                path,
                format,
                reason,
            } => write!(
                f,
                "'{}': cannot decode as {format}: {reason}",
                path.display()
            ),
            Self::Zip { path, source } => {
                write!(f, "'{}': corrupt ZIP container: {source}", path.display())
            }
            Self::Sqlite { path, source } => {
                write!(f, "'{}': SQLite error: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Zip { source, .. } => Some(source),
            Self::Sqlite { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ExtractError> for PiiScanError {
    fn from(e: ExtractError) -> Self {
        Self::Extract(e)
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Errors produced by detection engines.
#[derive(Debug)]
pub enum EngineError {
    /// The engine failed its readiness check.
    Unavailable { engine: &'static str, reason: String },

    /// `detect` failed for one chunk.
    Detection { engine: &'static str, reason: String },

    /// An HTTP request to a model endpoint failed.
    Http { engine: &'static str, reason: String },

    /// An endpoint response could not be parsed.
    ResponseParse { engine: &'static str, reason: String },

    /// The engine panicked; the panic was contained by the registry.
    Panicked { engine: &'static str },
}

impl EngineError {
    /// Name of the engine that produced the error.
    pub fn engine(&self) -> &'static str {
        match self {
            Self::Unavailable { engine, .. }
            | Self::Detection { engine, .. }
            | Self::Http { engine, .. }
            | Self::ResponseParse { engine, .. }
            | Self::Panicked { engine } => engine,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { engine, reason } => {
                write!(f, "Engine '{engine}' is unavailable: {reason}")
            }
            Self::Detection { engine, reason } => {
                write!(f, "Engine '{engine}' detection failed: {reason}")
            }
            Self::Http { engine, reason } => {
                write!(f, "Engine '{engine}' request failed: {reason}")
            }
            Self::ResponseParse { engine, reason } => {
                write!(f, "Engine '{engine}' returned an unparseable response: {reason}")
            }
            Self::Panicked { engine } => {
                write!(f, "Engine '{engine}' panicked while processing a chunk")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<EngineError> for PiiScanError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

// ---------------------------------------------------------------------------
// Writer errors
// ---------------------------------------------------------------------------

/// Errors related to output writing. Fatal: the run drains and finalises.
#[derive(Debug)]
pub enum WriterError {
    /// I/O error on the output file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// XLSX container assembly error.
    Xlsx {
        path: PathBuf,
        source: zip::result::ZipError,
    },
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Output I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV output error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON output error '{}': {source}", path.display())
            }
            Self::Xlsx { path, source } => {
                write!(f, "XLSX output error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Xlsx { source, .. } => Some(source),
        }
    }
}

impl From<WriterError> for PiiScanError {
    fn from(e: WriterError) -> Self {
        Self::Writer(e)
    }
}

/// Convenience type alias for piiscan results.
pub type Result<T> = std::result::Result<T, PiiScanError>;
