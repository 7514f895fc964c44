// piiscan - core/model.rs
//
// Core data model types. Pure data definitions with no I/O.
// These types are the shared vocabulary across all layers: the scanner
// produces `CandidateFile`s, extractors produce `TextContent`, engines
// produce `EngineMatch`es, and the processor stamps them into `Finding`s.

use crate::util::error::ExtractError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// =============================================================================
// Finding (the unit of output)
// =============================================================================

/// A single emitted detection.
///
/// Flows by value from the engine registry through the match container to
/// the writer; nothing is shared after handoff.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    /// Exact surface form from the input text.
    #[serde(rename = "match")]
    pub text: String,

    /// Absolute path of the file the match came from.
    pub file: PathBuf,

    /// Type tag: one of the configured labels, or an engine-prefixed label
    /// (e.g. "spacy:MISC") for tags outside the configured set.
    #[serde(rename = "type")]
    pub label: String,

    /// Confidence in [0, 1]. Absent for pattern matches, present for
    /// model-based matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Name of the engine that produced the match.
    pub engine: String,

    /// Free-form engine metadata (model name, entity tag, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Finding {
    /// Deduplication key: same entity, same file, same engine.
    /// Different engines reporting the same entity are preserved so the
    /// consumer can cross-validate.
    pub fn dedup_key(&self) -> (String, PathBuf, String) {
        (
            self.text.to_lowercase(),
            self.file.clone(),
            self.engine.clone(),
        )
    }
}

// =============================================================================
// Engine match (engine-side value, before provenance stamping)
// =============================================================================

/// A detection as returned by an engine. Engines do not know the file path;
/// the processor converts matches to `Finding`s with path and engine name.
#[derive(Debug, Clone)]
pub struct EngineMatch {
    /// Exact surface form from the chunk.
    pub text: String,

    /// Type label (already mapped through the engine's label table).
    pub label: String,

    /// Confidence in [0, 1]; `None` for pattern matches.
    pub confidence: Option<f64>,

    /// Free-form metadata attached by the engine.
    pub metadata: BTreeMap<String, String>,
}

impl EngineMatch {
    /// Stamp provenance onto the match, producing the output value.
    pub fn into_finding(self, file: &PathBuf, engine: &str) -> Finding {
        Finding {
            text: self.text,
            file: file.clone(),
            label: self.label,
            confidence: self.confidence,
            engine: engine.to_string(),
            metadata: self.metadata,
        }
    }
}

// =============================================================================
// Candidate file (output of the discovery phase)
// =============================================================================

/// Per-file transient value produced by the scanner for each admitted file.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Absolute (canonicalised) path.
    pub path: PathBuf,

    /// On-disk size in bytes.
    pub size: u64,

    /// Lower-cased extension including the leading dot; empty if none.
    pub extension: String,

    /// Sniffed MIME type, present only when magic detection resolved the
    /// extractor.
    pub mime: Option<String>,
}

// =============================================================================
// Text content (output of extraction)
// =============================================================================

/// A finite lazy sequence of text chunks. Chunks correspond to natural
/// document units (pages, sheets, messages). Not restartable.
pub type ChunkIter = Box<dyn Iterator<Item = Result<String, ExtractError>> + Send>;

/// What an extractor yields for one file.
pub enum TextContent {
    /// The whole file's text, eagerly decoded.
    Text(String),

    /// A lazy chunk sequence for formats too large to load whole.
    Chunks(ChunkIter),

    /// Opaque handoff marker for image files: no text output, the file is
    /// routed to the multimodal engine (or skipped when it is disabled).
    Image,
}

impl fmt::Debug for TextContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Self::Chunks(_) => f.write_str("Chunks(..)"),
            Self::Image => f.write_str("Image"),
        }
    }
}

// =============================================================================
// Output selectors
// =============================================================================

/// Findings file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
    Xlsx,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(format!("unknown format '{other}' (expected csv, json or xlsx)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Summary rendering selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    Human,
    Json,
}

impl FromStr for SummaryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown summary format '{other}' (expected human or json)")),
        }
    }
}

impl fmt::Display for SummaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => f.write_str("human"),
            Self::Json => f.write_str("json"),
        }
    }
}

// =============================================================================
// Engine concurrency discipline
// =============================================================================

/// How an engine may be invoked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Safe to call from any number of threads without coordination.
    Stateless,

    /// The underlying runtime is not safe for concurrent invocation; the
    /// registry serialises calls behind an engine-local mutex.
    RequiresExclusive,

    /// Network-bound; the engine enforces its own outbound-request bound,
    /// the registry holds no lock.
    ExternalSerialized,
}
