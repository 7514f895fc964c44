// piiscan - util/logging.rs
//
// Structured logging with runtime-selectable verbosity and an optional
// per-run debug log file.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flags: --verbose (debug) / --quiet (error)
//
// Output: stderr, plus a full debug-level file in the output directory
// when a log path is supplied. Never logs secrets or API keys at any level.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Initialise the logging subsystem.
///
/// `verbose` and `quiet` come from the CLI; `log_file` is the per-run
/// debug log path (created fresh, truncating any existing file).
///
/// Priority for the stderr level: RUST_LOG env var > --verbose / --quiet >
/// default "info". The file layer always records at debug level.
pub fn init(verbose: bool, quiet: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let stderr_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .with_filter(stderr_filter);

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Arc::new(file))
                .with_filter(LevelFilter::DEBUG);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
        }
    }

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        "Logging initialised"
    );
    Ok(())
}
