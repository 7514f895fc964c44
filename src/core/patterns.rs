// piiscan - core/patterns.rs
//
// Pattern configuration loading, validation, and compilation.
// Accepts JSON strings and compiles them into the runtime tables used by
// the pattern engine and the NER engines; I/O for override files happens
// in the app layer, which feeds content here.
//
// The pattern file has two arrays:
//   "regex"  - entries {label, value, regex_compiled_pos, expression}
//   "ai-ner" - entries {label, value, term}
// The regex entries are combined into one non-capturing alternation; each
// alternative's leftmost capture-group index maps back to its label.

use crate::util::constants;
use crate::util::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Built-in pattern table, compiled into the binary so the scanner works
/// with no external files.
const BUILTIN_PATTERNS: &str = include_str!("../../assets/patterns.json");

// =============================================================================
// JSON deserialization structures (raw input)
// =============================================================================

/// Raw pattern file as deserialized from JSON.
#[derive(Debug, Deserialize)]
pub struct PatternFile {
    #[serde(default)]
    pub regex: Vec<RegexEntry>,

    #[serde(rename = "ai-ner", default)]
    pub ai_ner: Vec<NerEntry>,
}

/// One regex pattern entry.
#[derive(Debug, Deserialize)]
pub struct RegexEntry {
    /// Type label emitted for matches of this entry (e.g. "email").
    pub label: String,

    /// Human-readable name (e.g. "E-mail address").
    pub value: String,

    /// Declared leftmost capture-group index of this entry within the
    /// combined alternation. Validated against the computed position.
    pub regex_compiled_pos: usize,

    /// The entry's regular expression. Must contain at least one
    /// capturing group; named groups are not used by the pattern file.
    pub expression: String,
}

/// One AI-NER label entry.
#[derive(Debug, Deserialize)]
pub struct NerEntry {
    /// Type label emitted for entities of this kind (e.g. "person").
    pub label: String,

    /// Human-readable name.
    pub value: String,

    /// The term handed to the model (and the tag expected back from it).
    pub term: String,
}

// =============================================================================
// Compiled runtime tables
// =============================================================================

/// Runtime pattern tables after validation and regex compilation.
#[derive(Debug)]
pub struct CompiledPatterns {
    /// The combined alternation over all regex entries.
    pub combined: Regex,

    /// Capture-group index -> type label, ascending by index.
    group_labels: Vec<(usize, String)>,

    /// Model term -> type label.
    term_labels: BTreeMap<String, String>,

    /// Ordered NER terms, as handed to model engines.
    ner_terms: Vec<String>,

    /// Every label the configuration knows about (regex + ai-ner).
    known_labels: Vec<String>,
}

impl CompiledPatterns {
    /// Type label for a match of the combined pattern: the label of the
    /// lowest-indexed capture group that participated.
    pub fn label_for(&self, caps: &regex::Captures<'_>) -> Option<&str> {
        self.group_labels
            .iter()
            .find(|(idx, _)| caps.get(*idx).is_some())
            .map(|(_, label)| label.as_str())
    }

    /// The surface text captured for a match of the combined pattern.
    pub fn captured_text<'t>(&self, caps: &regex::Captures<'t>) -> Option<&'t str> {
        self.group_labels
            .iter()
            .find_map(|(idx, _)| caps.get(*idx))
            .map(|m| m.as_str())
    }

    /// Ordered model terms for the NER engines.
    pub fn ner_terms(&self) -> &[String] {
        &self.ner_terms
    }

    /// Type label for a model term (or tag), if configured.
    pub fn label_for_term(&self, term: &str) -> Option<&str> {
        self.term_labels.get(term).map(String::as_str)
    }

    /// True if `label` is one of the configured type labels.
    pub fn is_known_label(&self, label: &str) -> bool {
        self.known_labels.iter().any(|l| l == label)
    }
}

// =============================================================================
// Parsing and compilation
// =============================================================================

/// Parse a pattern JSON string. `source_name` is used for error messages
/// only ("<built-in>" for the embedded table).
pub fn parse_pattern_json(json: &str, source_name: &str) -> Result<PatternFile, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::PatternParse {
        source_name: source_name.to_string(),
        source: e,
    })
}

/// Validate a `PatternFile` and compile it into runtime tables.
///
/// Builds the combined alternation `(?:e1)|(?:e2)|...`, computes each
/// entry's leftmost capture-group index, and cross-checks it against the
/// declared `regex_compiled_pos`.
pub fn compile(file: PatternFile) -> Result<CompiledPatterns, ConfigError> {
    let mut alternatives = Vec::with_capacity(file.regex.len());
    let mut group_labels = Vec::with_capacity(file.regex.len());
    let mut next_group = 1usize;

    for entry in &file.regex {
        if entry.expression.len() > constants::MAX_PATTERN_LENGTH {
            return Err(ConfigError::PatternTooLong {
                label: entry.label.clone(),
                length: entry.expression.len(),
                max_length: constants::MAX_PATTERN_LENGTH,
            });
        }

        // Each alternative needs a capturing group so a match can be
        // attributed to its entry. Entries without one are wrapped.
        let groups = count_capture_groups(&entry.expression);
        let expression = if groups == 0 {
            format!("({})", entry.expression)
        } else {
            entry.expression.clone()
        };
        let groups = groups.max(1);

        // Validate the expression on its own so errors name the entry.
        Regex::new(&expression).map_err(|e| ConfigError::InvalidPattern {
            label: entry.label.clone(),
            pattern: entry.expression.clone(),
            source: e,
        })?;

        if entry.regex_compiled_pos != next_group {
            return Err(ConfigError::GroupPositionMismatch {
                label: entry.label.clone(),
                stored: entry.regex_compiled_pos,
                computed: next_group,
            });
        }

        group_labels.push((next_group, entry.label.clone()));
        alternatives.push(format!("(?:{expression})"));
        next_group += groups;
    }

    let combined_src = alternatives.join("|");
    let combined = Regex::new(&combined_src).map_err(|e| ConfigError::InvalidPattern {
        label: "<combined>".to_string(),
        pattern: combined_src.clone(),
        source: e,
    })?;

    let mut term_labels = BTreeMap::new();
    let mut ner_terms = Vec::with_capacity(file.ai_ner.len());
    for entry in &file.ai_ner {
        term_labels.insert(entry.term.clone(), entry.label.clone());
        ner_terms.push(entry.term.clone());
    }

    let mut known_labels: Vec<String> = file.regex.iter().map(|e| e.label.clone()).collect();
    known_labels.extend(file.ai_ner.iter().map(|e| e.label.clone()));
    known_labels.dedup();

    tracing::debug!(
        regex_entries = file.regex.len(),
        ner_entries = file.ai_ner.len(),
        "Pattern tables compiled"
    );

    Ok(CompiledPatterns {
        combined,
        group_labels,
        term_labels,
        ner_terms,
        known_labels,
    })
}

/// Parse and compile the embedded built-in pattern table.
pub fn load_builtin() -> Result<CompiledPatterns, ConfigError> {
    compile(parse_pattern_json(BUILTIN_PATTERNS, "<built-in>")?)
}

/// Number of capturing groups in a regex expression.
///
/// A capturing group is `(` not followed by `?` and not inside a character
/// class; escaped parentheses do not count. Named groups (`(?P<..>`) are
/// not used by the pattern file and are intentionally not counted.
fn count_capture_groups(expr: &str) -> usize {
    let bytes = expr.as_bytes();
    let mut count = 0;
    let mut in_class = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => {
                if bytes.get(i + 1) != Some(&b'?') {
                    count += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    count
}

// =============================================================================
// Whitelist
// =============================================================================

/// Compile whitelist entries (literal surface forms) into one anchored
/// alternation. Returns `None` for an empty list: nothing is whitelisted.
pub fn compile_whitelist(entries: &[String]) -> Result<Option<Regex>, ConfigError> {
    let entries: Vec<&String> = entries
        .iter()
        .filter(|e| !e.trim().is_empty())
        .collect();

    if entries.is_empty() {
        return Ok(None);
    }
    if entries.len() > constants::MAX_WHITELIST_ENTRIES {
        return Err(ConfigError::WhitelistTooLarge {
            count: entries.len(),
            max: constants::MAX_WHITELIST_ENTRIES,
        });
    }

    let alternation = entries
        .iter()
        .map(|e| regex::escape(e.trim()))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!("^(?:{alternation})$");

    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| ConfigError::InvalidWhitelist { source: e })
}

// =============================================================================
// Tests
// =============================================================================
