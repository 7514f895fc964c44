// piiscan - app/config.rs
//
// Run configuration assembly. Defaulting happens in exactly one place:
// this module merges defaults <- config file <- CLI options into a fully
// populated, immutable `Config`; downstream code never falls back again.

use crate::core::model::{OutputFormat, SummaryFormat};
use crate::core::patterns::{self, CompiledPatterns};
use crate::engines::llm::LlmSettings;
use crate::util::constants;
use crate::util::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// CLI-facing options (populated by main from clap)
// =============================================================================

/// Options as they arrive from the command line. `None` means "not given
/// on the CLI" and falls through to the config file, then the default.
#[derive(Debug, Default, Clone)]
pub struct CliOptions {
    pub root: PathBuf,

    pub regex: bool,
    pub ner: bool,
    pub spacy_ner: bool,
    pub ollama: bool,
    pub openai: bool,
    pub multimodal: bool,

    pub outname: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub no_header: bool,
    pub whitelist: Option<PathBuf>,
    pub stop_count: Option<u64>,
    pub config: Option<PathBuf>,
    pub summary_format: Option<SummaryFormat>,
    pub verbose: bool,
    pub quiet: bool,
    pub use_magic_detection: bool,
    pub max_file_size_mb: Option<u64>,
}

// =============================================================================
// Config file (YAML or JSON)
// =============================================================================

/// Raw config file. Every field optional; CLI values win.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub engines: EnginesSection,

    pub outname: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub format: Option<String>,
    pub no_header: Option<bool>,
    pub whitelist: Option<PathBuf>,
    pub stop_count: Option<u64>,
    pub summary_format: Option<String>,
    pub use_magic_detection: Option<bool>,
    pub max_file_size_mb: Option<u64>,
    pub workers: Option<usize>,

    /// Override path for the pattern JSON (defaults to the embedded table).
    pub patterns: Option<PathBuf>,

    #[serde(default)]
    pub ner: NerSection,
    #[serde(default)]
    pub spacy: NerSection,
    #[serde(default)]
    pub ollama: LlmSection,
    #[serde(default)]
    pub openai: LlmSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnginesSection {
    pub regex: Option<bool>,
    pub ner: Option<bool>,
    pub spacy_ner: Option<bool>,
    pub ollama: Option<bool>,
    pub openai: Option<bool>,
    pub multimodal: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NerSection {
    pub model_dir: Option<PathBuf>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub threshold: Option<f64>,
}

// =============================================================================
// Runtime configuration
// =============================================================================

/// Which engines the run uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSelection {
    pub regex: bool,
    pub ner: bool,
    pub spacy_ner: bool,
    pub ollama: bool,
    pub openai: bool,
    pub multimodal: bool,
}

/// Settings for one model-backed NER engine.
#[derive(Debug, Clone)]
pub struct NerSettings {
    pub model_dir: PathBuf,
    pub threshold: f64,
}

/// Fully populated, immutable run configuration.
#[derive(Debug)]
pub struct Config {
    pub root: PathBuf,
    pub engines: EngineSelection,

    pub patterns: Arc<CompiledPatterns>,
    pub whitelist: Option<Regex>,

    pub max_file_size: u64,
    pub stop_count: Option<u64>,
    pub use_magic_detection: bool,
    pub workers: usize,

    pub output_format: OutputFormat,
    pub output_dir: PathBuf,
    pub outname: String,
    pub csv_header: bool,
    pub summary_format: SummaryFormat,

    pub verbose: bool,
    pub quiet: bool,

    pub ner: Option<NerSettings>,
    pub spacy: Option<NerSettings>,
    pub ollama: LlmSettings,
    pub openai: LlmSettings,
}

/// Merge CLI options against an optional config file and the defaults,
/// loading and compiling the pattern tables and the whitelist.
pub fn build(cli: CliOptions) -> Result<Config, ConfigError> {
    let file = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let engines = EngineSelection {
        regex: cli.regex || file.engines.regex.unwrap_or(false),
        ner: cli.ner || file.engines.ner.unwrap_or(false),
        spacy_ner: cli.spacy_ner || file.engines.spacy_ner.unwrap_or(false),
        ollama: cli.ollama || file.engines.ollama.unwrap_or(false),
        openai: cli.openai || file.engines.openai.unwrap_or(false),
        multimodal: cli.multimodal || file.engines.multimodal.unwrap_or(false),
    };
    if !(engines.regex || engines.ner || engines.spacy_ner) {
        return Err(ConfigError::NoEngines);
    }

    let max_file_size_mb = cli
        .max_file_size_mb
        .or(file.max_file_size_mb)
        .unwrap_or(constants::DEFAULT_MAX_FILE_SIZE_MB);
    if max_file_size_mb == 0 || max_file_size_mb > constants::ABSOLUTE_MAX_FILE_SIZE_MB {
        return Err(ConfigError::ValueOutOfRange {
            field: "max_file_size_mb".to_string(),
            value: max_file_size_mb.to_string(),
            expected: format!("1..={}", constants::ABSOLUTE_MAX_FILE_SIZE_MB),
        });
    }

    let workers = file.workers.unwrap_or(constants::DEFAULT_WORKERS);
    if workers == 0 || workers > constants::MAX_WORKERS {
        return Err(ConfigError::ValueOutOfRange {
            field: "workers".to_string(),
            value: workers.to_string(),
            expected: format!("1..={}", constants::MAX_WORKERS),
        });
    }

    let stop_count = cli.stop_count.or(file.stop_count);
    if stop_count == Some(0) {
        return Err(ConfigError::ValueOutOfRange {
            field: "stop_count".to_string(),
            value: "0".to_string(),
            expected: "a positive count".to_string(),
        });
    }

    let output_format = match cli.format {
        Some(format) => format,
        None => parse_selector(file.format.as_deref(), OutputFormat::Csv, "format")?,
    };
    let summary_format = match cli.summary_format {
        Some(format) => format,
        None => parse_selector(
            file.summary_format.as_deref(),
            SummaryFormat::Human,
            "summary_format",
        )?,
    };

    let patterns = match &file.patterns {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            patterns::compile(patterns::parse_pattern_json(
                &raw,
                &path.display().to_string(),
            )?)?
        }
        None => patterns::load_builtin()?,
    };
    let patterns = Arc::new(patterns);

    let whitelist = match cli.whitelist.as_ref().or(file.whitelist.as_ref()) {
        Some(path) => patterns::compile_whitelist(&load_whitelist(path)?)?,
        None => None,
    };

    let ner = build_ner(&file.ner);
    let spacy = build_ner(&file.spacy);
    let ollama = build_llm(&file.ollama, true, constants::OLLAMA_API_KEY_ENV);
    let openai = build_llm(&file.openai, false, constants::OPENAI_API_KEY_ENV);

    Ok(Config {
        root: cli.root,
        engines,
        patterns,
        whitelist,
        max_file_size: max_file_size_mb * 1024 * 1024,
        stop_count,
        use_magic_detection: cli.use_magic_detection || file.use_magic_detection.unwrap_or(false),
        workers,
        output_format,
        output_dir: cli
            .output_dir
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_OUTPUT_DIR)),
        outname: cli
            .outname
            .or(file.outname)
            .unwrap_or_else(|| "scan".to_string()),
        csv_header: !(cli.no_header || file.no_header.unwrap_or(false)),
        summary_format,
        verbose: cli.verbose,
        quiet: cli.quiet,
        ner,
        spacy,
        ollama,
        openai,
    })
}

fn build_ner(section: &NerSection) -> Option<NerSettings> {
    section.model_dir.as_ref().map(|model_dir| NerSettings {
        model_dir: model_dir.clone(),
        threshold: section.threshold.unwrap_or(constants::DEFAULT_NER_THRESHOLD),
    })
}

fn build_llm(section: &LlmSection, local_default: bool, key_env: &str) -> LlmSettings {
    let base_url = section.base_url.clone().unwrap_or_else(|| {
        if local_default {
            constants::DEFAULT_OLLAMA_BASE_URL.to_string()
        } else {
            "https://api.openai.com/v1".to_string()
        }
    });
    LlmSettings {
        base_url: base_url.trim_end_matches('/').to_string(),
        model: section
            .model
            .clone()
            .unwrap_or_else(|| constants::DEFAULT_OLLAMA_MODEL.to_string()),
        api_key: section
            .api_key
            .clone()
            .or_else(|| std::env::var(key_env).ok()),
        timeout: Duration::from_secs(
            section
                .timeout_secs
                .unwrap_or(constants::DEFAULT_LLM_TIMEOUT_SECS),
        ),
        threshold: section.threshold.unwrap_or(constants::DEFAULT_NER_THRESHOLD),
    }
}

fn parse_selector<T: std::str::FromStr<Err = String>>(
    value: Option<&str>,
    default: T,
    field: &str,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: String| ConfigError::ValueOutOfRange {
            field: field.to_string(),
            value: raw.to_string(),
            expected: e,
        }),
    }
}

/// Parse a YAML or JSON config file (YAML is a superset here; .json files
/// go through the JSON parser for precise errors).
fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&raw).map_err(|e| ConfigError::FileParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    } else {
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::FileParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// One whitelist entry per line; blank lines are ignored.
fn load_whitelist(path: &Path) -> Result<Vec<String>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::WhitelistIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(raw.lines().map(str::to_string).collect())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn minimal_cli(root: &Path) -> CliOptions {
        CliOptions {
            root: root.to_path_buf(),
            regex: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_fully_populate() {
        let dir = tempfile::tempdir().unwrap();
        let config = build(minimal_cli(dir.path())).unwrap();
        assert_eq!(config.output_format, OutputFormat::Csv);
        assert_eq!(config.summary_format, SummaryFormat::Human);
        assert_eq!(
            config.max_file_size,
            constants::DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024
        );
        assert_eq!(config.outname, "scan");
        assert!(config.csv_header);
        assert_eq!(config.workers, 1);
        assert!(config.whitelist.is_none());
    }

    #[test]
    fn test_no_engine_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliOptions {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(build(cli), Err(ConfigError::NoEngines)));
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("piiscan.yaml");
        fs::write(
            &config_path,
            "outname: from-file\nformat: json\nmax_file_size_mb: 10\n",
        )
        .unwrap();

        let mut cli = minimal_cli(dir.path());
        cli.config = Some(config_path);
        cli.outname = Some("from-cli".to_string());
        let config = build(cli).unwrap();

        assert_eq!(config.outname, "from-cli", "CLI wins");
        assert_eq!(config.output_format, OutputFormat::Json, "file fills gaps");
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_json_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("piiscan.json");
        fs::write(
            &config_path,
            r#"{"engines": {"ner": true}, "ner": {"model_dir": "/models/ner"}}"#,
        )
        .unwrap();

        let mut cli = CliOptions {
            root: dir.path().to_path_buf(),
            config: Some(config_path),
            ..Default::default()
        };
        cli.regex = false;
        let config = build(cli).unwrap();
        assert!(config.engines.ner, "file can enable engines");
        assert_eq!(
            config.ner.as_ref().unwrap().model_dir,
            PathBuf::from("/models/ner")
        );
    }

    #[test]
    fn test_malformed_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("broken.yaml");
        fs::write(&config_path, "outname: [unterminated").unwrap();

        let mut cli = minimal_cli(dir.path());
        cli.config = Some(config_path);
        assert!(matches!(build(cli), Err(ConfigError::FileParse { .. })));
    }

    #[test]
    fn test_unknown_config_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("typo.yaml");
        fs::write(&config_path, "outnmae: typo\n").unwrap();

        let mut cli = minimal_cli(dir.path());
        cli.config = Some(config_path);
        assert!(matches!(build(cli), Err(ConfigError::FileParse { .. })));
    }

    #[test]
    fn test_whitelist_loaded_and_compiled() {
        let dir = tempfile::tempdir().unwrap();
        let whitelist_path = dir.path().join("allow.txt");
        fs::write(&whitelist_path, "u@example.com\n\nother@example.com\n").unwrap();

        let mut cli = minimal_cli(dir.path());
        cli.whitelist = Some(whitelist_path);
        let config = build(cli).unwrap();
        let whitelist = config.whitelist.unwrap();
        assert!(whitelist.is_match("u@example.com"));
        assert!(whitelist.is_match("other@example.com"));
        assert!(!whitelist.is_match("third@example.com"));
    }

    #[test]
    fn test_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = minimal_cli(dir.path());
        cli.max_file_size_mb = Some(0);
        assert!(matches!(
            build(cli),
            Err(ConfigError::ValueOutOfRange { .. })
        ));

        let mut cli = minimal_cli(dir.path());
        cli.stop_count = Some(0);
        assert!(matches!(
            build(cli),
            Err(ConfigError::ValueOutOfRange { .. })
        ));
    }
}
