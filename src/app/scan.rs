// piiscan - app/scan.rs
//
// The scan driver: walks the tree, extracts each admitted file, runs the
// engine registry over the extracted text, and finalises the outputs.
//
// Single-threaded by default so the global finding order matches the
// traversal order; with `workers > 1` admitted files are fanned out to a
// rayon pool (per-file finding order is preserved, interleaving between
// files is not).
//
// Finalisation runs on every termination path: completion, stop-count,
// and fatal mid-scan errors all drain through `finalize` so the output
// file is closed exactly once.

use crate::app::context::AppContext;
use crate::core::discovery::{self, ScanOptions};
use crate::core::model::CandidateFile;
use crate::core::stats::Summary;
use crate::util::error::{ErrorKind, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::time::Duration;

/// Run the scan to completion and return the frozen summary.
///
/// A fatal error (writer failure, unreadable root) still produces a
/// summary and a finalised output file; the error is returned after the
/// drain.
pub fn run(context: &AppContext) -> (Result<()>, Result<Summary>) {
    let progress = make_progress(context);
    let scan_result = if context.config.workers > 1 {
        run_parallel(context, &progress)
    } else {
        run_sequential(context, &progress)
    };
    progress.finish_and_clear();

    if let Err(e) = &scan_result {
        tracing::error!(error = %e, "Scan aborted, draining and finalising outputs");
    }
    let summary = finalize(context);
    (scan_result, summary)
}

fn scan_options(context: &AppContext) -> ScanOptions {
    ScanOptions {
        max_file_size: context.config.max_file_size,
        stop_count: context.config.stop_count,
        use_magic_detection: context.config.use_magic_detection,
    }
}

/// Default path: extract and process inline, in traversal order.
fn run_sequential(context: &AppContext, progress: &ProgressBar) -> Result<()> {
    discovery::scan_tree(
        &context.config.root,
        &context.formats,
        &scan_options(context),
        &context.stats,
        |candidate, extractor| {
            progress.set_message(candidate.path.display().to_string());
            progress.inc(1);
            process_file(context, &candidate, extractor)
        },
    )
}

/// Worker-pool path: collect admitted files first, then fan out.
fn run_parallel(context: &AppContext, progress: &ProgressBar) -> Result<()> {
    let mut admitted: Vec<CandidateFile> = Vec::new();
    discovery::scan_tree(
        &context.config.root,
        &context.formats,
        &scan_options(context),
        &context.stats,
        |candidate, _| {
            admitted.push(candidate);
            Ok(())
        },
    )?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(context.config.workers)
        .build()
        .map_err(|e| {
            crate::util::error::PiiScanError::Config(
                crate::util::error::ConfigError::ValueOutOfRange {
                    field: "workers".to_string(),
                    value: context.config.workers.to_string(),
                    expected: format!("a buildable thread pool ({e})"),
                },
            )
        })?;

    pool.install(|| {
        admitted
            .par_iter()
            .map(|candidate| {
                progress.inc(1);
                // Re-resolve the extractor inside the worker; the
                // selection cache makes this cheap.
                let resolved = context.formats.resolve(
                    &candidate.extension,
                    &candidate.path,
                    context.config.use_magic_detection,
                );
                match resolved {
                    Some((extractor, _)) => process_file(context, candidate, extractor),
                    None => Ok(()),
                }
            })
            .collect::<Result<()>>()
    })
}

/// Extract one admitted file and run the engines over its text. Extraction
/// failures are counted and recoverable; only writer errors propagate.
fn process_file(
    context: &AppContext,
    candidate: &CandidateFile,
    extractor: &dyn crate::extract::TextExtractor,
) -> Result<()> {
    tracing::debug!(
        path = %candidate.path.display(),
        extractor = extractor.name(),
        size = candidate.size,
        "Processing file"
    );
    match extractor.extract(&candidate.path) {
        Ok(content) => context.engines.process(
            &candidate.path,
            content,
            &context.container,
            &context.stats,
        ),
        Err(e) => {
            tracing::warn!(path = %candidate.path.display(), error = %e, "Extraction failed");
            context
                .stats
                .record_error(ErrorKind::Extraction, &candidate.path);
            Ok(())
        }
    }
}

/// Freeze statistics, snapshot the summary, and finalise the writer.
fn finalize(context: &AppContext) -> Result<Summary> {
    context.stats.freeze();
    let mut container = context.container.lock().expect("match container poisoned");
    let summary = context.stats.snapshot(container.counts());
    container.close(&summary)?;
    tracing::info!(
        files = summary.files_analyzed,
        matches = summary.matches,
        errors = summary.errors_total,
        "Scan finished"
    );
    Ok(summary)
}

fn make_progress(context: &AppContext) -> ProgressBar {
    if context.config.quiet {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner} {pos} files  {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}

// =============================================================================
// Tests
// =============================================================================
