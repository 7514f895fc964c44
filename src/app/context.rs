// piiscan - app/context.rs
//
// The run-scoped application context: owns the config, statistics, format
// registry, engine registry, match container, and the output paths. Built
// once per invocation; nothing outlives it.

use crate::app::config::Config;
use crate::core::matches::MatchContainer;
use crate::core::stats::Statistics;
use crate::core::writers;
use crate::engines::gliner::AiNerEngine;
use crate::engines::llm::LlmEngine;
use crate::engines::multimodal::MultimodalEngine;
use crate::engines::pattern::PatternEngine;
use crate::engines::spacy::PipelineNerEngine;
use crate::engines::{DetectionEngine, EngineRegistry};
use crate::extract::FormatRegistry;
use crate::util::constants;
use crate::util::error::{ConfigError, EngineError, ErrorKind, PiiScanError, Result};
use std::path::PathBuf;
use std::sync::Mutex;

/// Everything one run owns.
pub struct AppContext {
    pub config: Config,
    pub stats: Statistics,
    pub formats: FormatRegistry,
    pub engines: EngineRegistry,
    pub container: Mutex<MatchContainer>,
    pub findings_path: PathBuf,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("findings_path", &self.findings_path)
            .finish_non_exhaustive()
    }
}

/// Output file paths for one run, derived from the output directory, the
/// name stem, and the run timestamp.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub findings: PathBuf,
    pub log: PathBuf,
}

/// Compute the run's output paths: `<timestamp> <outname>_findings.<ext>`
/// and `<timestamp> <outname>_log.txt`.
pub fn output_paths(config: &Config) -> OutputPaths {
    let timestamp = chrono::Local::now().format(constants::OUTPUT_TIMESTAMP_FORMAT);
    let stem = format!("{timestamp} {}", config.outname);
    OutputPaths {
        findings: config.output_dir.join(format!(
            "{stem}_findings.{}",
            config.output_format.extension()
        )),
        log: config.output_dir.join(format!("{stem}_log.txt")),
    }
}

/// Build the context: instantiate the enabled engines (checking
/// availability; a requested engine that is unavailable is disabled with
/// a warning, and a run with no surviving engine aborts), then open the
/// findings writer.
///
/// Engine construction happens before the writer is opened so a fatal
/// engine failure leaves no output file behind.
pub fn build(config: Config, findings_path: PathBuf) -> Result<AppContext> {
    let stats = Statistics::new();
    let engines = build_engines(&config, &stats)?;
    tracing::info!(engines = ?engines.engine_names(), "Engines ready");

    let writer = writers::open_writer(config.output_format, &findings_path, config.csv_header)?;
    let container = Mutex::new(MatchContainer::new(config.whitelist.clone(), writer));

    Ok(AppContext {
        config,
        stats,
        formats: FormatRegistry::with_default_extractors(),
        engines,
        container,
        findings_path,
    })
}

/// Instantiate the enabled engines in their stable configured order.
fn build_engines(config: &Config, stats: &Statistics) -> Result<EngineRegistry> {
    let mut engines: Vec<Box<dyn DetectionEngine>> = Vec::new();
    let patterns = config.patterns.clone();

    if config.engines.regex {
        engines.push(Box::new(PatternEngine::new(patterns.clone())));
    }
    if config.engines.ner {
        let result = match &config.ner {
            Some(settings) => {
                AiNerEngine::new(&settings.model_dir, settings.threshold, patterns.clone())
                    .map(|e| Box::new(e) as Box<dyn DetectionEngine>)
            }
            None => Err(EngineError::Unavailable {
                engine: "gliner",
                reason: "no model_dir configured (config key: ner.model_dir)".to_string(),
            }),
        };
        push_or_disable(&mut engines, result, config, stats);
    }
    if config.engines.spacy_ner {
        let result = match &config.spacy {
            Some(settings) => {
                PipelineNerEngine::new(&settings.model_dir, settings.threshold, patterns.clone())
                    .map(|e| Box::new(e) as Box<dyn DetectionEngine>)
            }
            None => Err(EngineError::Unavailable {
                engine: "spacy",
                reason: "no model_dir configured (config key: spacy.model_dir)".to_string(),
            }),
        };
        push_or_disable(&mut engines, result, config, stats);
    }
    if config.engines.ollama {
        push_or_disable(
            &mut engines,
            LlmEngine::new("ollama", config.ollama.clone(), patterns.clone())
                .map(|e| Box::new(e) as Box<dyn DetectionEngine>),
            config,
            stats,
        );
    }
    if config.engines.openai {
        push_or_disable(
            &mut engines,
            LlmEngine::new("openai", config.openai.clone(), patterns.clone())
                .map(|e| Box::new(e) as Box<dyn DetectionEngine>),
            config,
            stats,
        );
    }
    if config.engines.multimodal {
        push_or_disable(
            &mut engines,
            MultimodalEngine::new(config.ollama.clone(), patterns.clone())
                .map(|e| Box::new(e) as Box<dyn DetectionEngine>),
            config,
            stats,
        );
    }

    // One-shot readiness checks; failing engines are disabled.
    let mut ready: Vec<Box<dyn DetectionEngine>> = Vec::new();
    for engine in engines {
        match engine.is_available() {
            Ok(()) => ready.push(engine),
            Err(e) => {
                tracing::warn!(engine = e.engine(), error = %e, "Engine unavailable, disabled");
                stats.record_error(ErrorKind::EngineUnavailable, &config.root);
            }
        }
    }

    if ready.is_empty() {
        return Err(PiiScanError::Config(ConfigError::NoEngines));
    }
    Ok(EngineRegistry::new(ready))
}

fn push_or_disable(
    engines: &mut Vec<Box<dyn DetectionEngine>>,
    result: std::result::Result<Box<dyn DetectionEngine>, EngineError>,
    config: &Config,
    stats: &Statistics,
) {
    match result {
        Ok(engine) => engines.push(engine),
        Err(e) => {
            tracing::warn!(engine = e.engine(), error = %e, "Engine unavailable, disabled");
            stats.record_error(ErrorKind::EngineUnavailable, &config.root);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::{self, CliOptions};
    use crate::core::model::OutputFormat;

    fn config_for(dir: &std::path::Path, cli: CliOptions) -> Config {
        let mut cli = cli;
        cli.root = dir.to_path_buf();
        cli.output_dir = Some(dir.to_path_buf());
        config::build(cli).unwrap()
    }

    #[test]
    fn test_output_paths_carry_stem_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = CliOptions {
            regex: true,
            outname: Some("audit".to_string()),
            ..Default::default()
        };
        cli.format = Some(OutputFormat::Xlsx);
        let config = config_for(dir.path(), cli);
        let paths = output_paths(&config);

        let findings = paths.findings.file_name().unwrap().to_str().unwrap();
        assert!(findings.ends_with("audit_findings.xlsx"), "got {findings}");
        let log = paths.log.file_name().unwrap().to_str().unwrap();
        assert!(log.ends_with("audit_log.txt"), "got {log}");
    }

    #[test]
    fn test_regex_only_context_builds() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(
            dir.path(),
            CliOptions {
                regex: true,
                ..Default::default()
            },
        );
        let findings = dir.path().join("out.csv");
        let context = build(config, findings.clone()).unwrap();
        assert_eq!(context.engines.engine_names(), vec!["regex"]);
        assert!(findings.exists(), "writer opened eagerly");
    }

    #[test]
    fn test_missing_ner_model_with_no_other_engine_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(
            dir.path(),
            CliOptions {
                ner: true,
                ..Default::default()
            },
        );
        let findings = dir.path().join("out.csv");
        let err = build(config, findings.clone()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(
            !findings.exists(),
            "no findings file is created when the run aborts at engine setup"
        );
    }

    #[test]
    fn test_missing_ner_model_with_regex_fallback_survives() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(
            dir.path(),
            CliOptions {
                regex: true,
                ner: true,
                ..Default::default()
            },
        );
        let context = build(config, dir.path().join("out.csv")).unwrap();
        assert_eq!(
            context.engines.engine_names(),
            vec!["regex"],
            "unavailable NER engine is disabled, regex survives"
        );
    }
}
