// piiscan - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing (subcommand `scan`)
// 2. Configuration assembly (defaults <- config file <- CLI)
// 3. Logging initialisation (stderr + per-run debug log file)
// 4. The scan run and exit-code mapping
//
// Exit codes: 0 success, 1 general error, 2 invalid arguments (clap),
// 3 root access error, 4 configuration error.

use clap::{Parser, Subcommand};
use piiscan::app::{config, context, scan};
use piiscan::core::model::{OutputFormat, SummaryFormat};
use piiscan::util;
use std::path::PathBuf;
use std::process::ExitCode;

/// piiscan - filesystem PII scanner.
///
/// Walks a directory tree, extracts text from documents, detects PII with
/// the enabled engines, filters findings against a whitelist, and writes
/// a findings report plus a run summary.
#[derive(Parser, Debug)]
#[command(name = util::constants::APP_NAME, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a directory tree for personally identifiable information.
    Scan(ScanArgs),
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    /// Root directory to scan.
    path: PathBuf,

    /// Enable the regex pattern engine.
    #[arg(long)]
    regex: bool,

    /// Enable the AI-NER engine (requires ner.model_dir in the config).
    #[arg(long)]
    ner: bool,

    /// Enable the pipeline NER engine (requires spacy.model_dir).
    #[arg(long = "spacy-ner")]
    spacy_ner: bool,

    /// Enable the Ollama chat engine.
    #[arg(long)]
    ollama: bool,

    /// Enable an OpenAI-compatible chat engine.
    #[arg(long = "openai-compatible")]
    openai: bool,

    /// Enable the multimodal engine for image files.
    #[arg(long)]
    multimodal: bool,

    /// Name stem included in output file names.
    #[arg(long)]
    outname: Option<String>,

    /// Output directory (created if absent).
    #[arg(long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Findings file format.
    #[arg(long, value_parser = clap::value_parser!(OutputFormat))]
    format: Option<OutputFormat>,

    /// Omit the CSV header row.
    #[arg(long = "no-header")]
    no_header: bool,

    /// Whitelist file: one exclusion surface form per line.
    #[arg(long)]
    whitelist: Option<PathBuf>,

    /// Terminate after this many admitted files.
    #[arg(long = "stop-count")]
    stop_count: Option<u64>,

    /// Load options from a YAML or JSON file; CLI values override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Summary rendering (human or json).
    #[arg(long = "summary-format", value_parser = clap::value_parser!(SummaryFormat))]
    summary_format: Option<SummaryFormat>,

    /// Debug logging on stderr.
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Errors only on stderr; no progress bar.
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    quiet: bool,

    /// Sniff file content when the extension is unknown.
    #[arg(long = "use-magic-detection")]
    use_magic_detection: bool,

    /// File-size ceiling in megabytes.
    #[arg(long = "max-file-size")]
    max_file_size: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Scan(args) = cli.command;
    ExitCode::from(run_scan(args))
}

fn run_scan(args: ScanArgs) -> u8 {
    let options = config::CliOptions {
        root: args.path,
        regex: args.regex,
        ner: args.ner,
        spacy_ner: args.spacy_ner,
        ollama: args.ollama,
        openai: args.openai,
        multimodal: args.multimodal,
        outname: args.outname,
        output_dir: args.output_dir,
        format: args.format,
        no_header: args.no_header,
        whitelist: args.whitelist,
        stop_count: args.stop_count,
        config: args.config,
        summary_format: args.summary_format,
        verbose: args.verbose,
        quiet: args.quiet,
        use_magic_detection: args.use_magic_detection,
        max_file_size_mb: args.max_file_size,
    };

    // Configuration errors happen before logging is up; report them
    // directly on stderr.
    let config = match config::build(options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return 4;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        eprintln!(
            "Error: cannot create output directory '{}': {e}",
            config.output_dir.display()
        );
        return 1;
    }
    let paths = context::output_paths(&config);
    if let Err(e) = util::logging::init(config.verbose, config.quiet, Some(&paths.log)) {
        eprintln!("Error: cannot open log file '{}': {e}", paths.log.display());
        return 1;
    }

    tracing::info!(
        version = util::constants::APP_VERSION,
        root = %config.root.display(),
        format = %config.output_format,
        "piiscan starting"
    );

    let context = match context::build(config, paths.findings.clone()) {
        Ok(context) => context,
        Err(e) => {
            tracing::error!(error = %e, "Run setup failed");
            eprintln!("Error: {e}");
            return e.exit_code() as u8;
        }
    };

    let (scan_result, summary) = scan::run(&context);

    let code = match (&scan_result, &summary) {
        (Ok(()), Ok(_)) => 0,
        (Err(e), _) => e.exit_code() as u8,
        (_, Err(e)) => e.exit_code() as u8,
    };
    if let Err(e) = &scan_result {
        eprintln!("Error: {e}");
    }
    if let Err(e) = &summary {
        eprintln!("Error: {e}");
    }

    if let Ok(summary) = summary {
        match context.config.summary_format {
            SummaryFormat::Human => println!("{}", summary.render_human()),
            SummaryFormat::Json => println!("{}", summary.render_json()),
        }
        if !context.config.quiet {
            eprintln!("Findings written to '{}'", context.findings_path.display());
        }
    }
    code
}
