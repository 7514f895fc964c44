// piiscan - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "piiscan";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Scan limits
// =============================================================================

/// Default file-size ceiling in megabytes. Files above this are skipped
/// and counted under `FileTooLarge`.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 64;

/// Hard upper bound on the configurable file-size ceiling (megabytes).
pub const ABSOLUTE_MAX_FILE_SIZE_MB: u64 = 4_096;

/// Number of bytes read from the head of a file for content-based MIME
/// sniffing when `--use-magic-detection` is enabled.
pub const SNIFF_BUFFER_SIZE: usize = 8_192;

/// Ceiling on the number of chunks consumed from a single file. Extractors
/// must yield finite sequences; this bound caps the damage from a corrupt
/// container that decodes into an absurd number of units.
pub const MAX_CHUNKS_PER_FILE: usize = 10_000;

/// Default number of scan workers. 1 preserves deterministic output order.
pub const DEFAULT_WORKERS: usize = 1;

/// Hard upper bound on the configurable worker count.
pub const MAX_WORKERS: usize = 64;

// =============================================================================
// Pattern limits
// =============================================================================

/// Maximum length of a single regex expression in the pattern file
/// (ReDoS guard).
pub const MAX_PATTERN_LENGTH: usize = 4_096;

/// Maximum number of whitelist entries accepted from `--whitelist`.
pub const MAX_WHITELIST_ENTRIES: usize = 10_000;

/// Type label emitted for credit-card matches; candidates under this label
/// must pass the Luhn checksum before they are emitted.
pub const CREDIT_CARD_LABEL: &str = "credit_card";

// =============================================================================
// Extraction limits
// =============================================================================

/// Maximum nesting depth for archive members that are themselves archives.
pub const MAX_ARCHIVE_DEPTH: usize = 4;

/// Maximum number of members processed from a single archive.
pub const MAX_ARCHIVE_MEMBERS: usize = 10_000;

/// Maximum rows read per SQLite table.
pub const MAX_SQLITE_ROWS_PER_TABLE: usize = 100_000;

// =============================================================================
// Engine defaults
// =============================================================================

/// Default confidence threshold for model-based engines.
pub const DEFAULT_NER_THRESHOLD: f64 = 0.5;

/// Default per-call timeout for LLM endpoints, in seconds.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Default base URL for the Ollama-style local endpoint.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Default model name for the Ollama-style local endpoint.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

/// Number of recent request latencies kept for adaptive rate limiting.
pub const LLM_LATENCY_WINDOW: usize = 10;

/// Mean latency (milliseconds) above which the LLM engine inserts a delay
/// before the next request.
pub const LLM_LATENCY_THRESHOLD_MS: u64 = 2_000;

/// Upper bound on the adaptive delay, in milliseconds.
pub const LLM_MAX_DELAY_MS: u64 = 5_000;

/// Maximum concurrent outbound requests per LLM engine.
pub const LLM_MAX_CONCURRENT_REQUESTS: usize = 4;

/// Maximum characters of a chunk forwarded to an LLM endpoint. Longer
/// chunks are truncated at a character boundary.
pub const LLM_MAX_CHUNK_CHARS: usize = 8_000;

/// Environment variable consulted for the OpenAI-compatible API key when
/// neither the CLI nor the config file provides one.
pub const OPENAI_API_KEY_ENV: &str = "PIISCAN_OPENAI_API_KEY";

/// Environment variable consulted for the Ollama API key.
pub const OLLAMA_API_KEY_ENV: &str = "PIISCAN_OLLAMA_API_KEY";

// =============================================================================
// Output
// =============================================================================

/// Default output directory, created if absent.
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Timestamp prefix format for output file names (local time).
pub const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H%M%S";

/// Columns of the findings table, in stable order. New columns may only be
/// appended.
pub const FINDINGS_COLUMNS: &[&str] = &["match", "file", "type", "confidence", "engine"];

// =============================================================================
// Logging
// =============================================================================

/// Default log level for the stderr layer.
pub const DEFAULT_LOG_LEVEL: &str = "info";
