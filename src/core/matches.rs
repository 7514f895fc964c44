// piiscan - core/matches.rs
//
// The match container: the de-duplicating, whitelist-filtering sink
// between the engine registry and the writer.
//
// All mutations are serialised by the caller (the application context
// holds the container behind a single mutex) so parallel engines can add
// findings safely. Counting invariant, checked by the test suite:
//   added == written + whitelisted + deduplicated

use crate::core::model::Finding;
use crate::core::stats::{MatchCounts, Summary};
use crate::core::writers::{FindingsWriter, WriteMode};
use crate::util::error::WriterError;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;

/// Whitelist-filtering, de-duplicating findings sink.
pub struct MatchContainer {
    /// Anchored alternation of whitelisted surface forms; `None` when the
    /// whitelist is empty.
    whitelist: Option<Regex>,

    /// Dedup keys seen so far: (lowercased text, path, engine).
    seen: HashSet<(String, PathBuf, String)>,

    writer: Box<dyn FindingsWriter>,
    counts: MatchCounts,
    closed: bool,
}

impl MatchContainer {
    pub fn new(whitelist: Option<Regex>, writer: Box<dyn FindingsWriter>) -> Self {
        Self {
            whitelist,
            seen: HashSet::new(),
            writer,
            counts: MatchCounts::default(),
            closed: false,
        }
    }

    /// Ingest one finding: drop it if whitelisted or already seen from the
    /// same engine on the same file, otherwise hand it to the writer.
    ///
    /// Engines filter on their own thresholds before emitting; no
    /// re-filtering happens here.
    pub fn add(&mut self, finding: Finding) -> Result<(), WriterError> {
        self.counts.added += 1;

        if let Some(whitelist) = &self.whitelist {
            if whitelist.is_match(&finding.text) {
                tracing::debug!(text = finding.text, "Finding whitelisted");
                self.counts.whitelisted += 1;
                return Ok(());
            }
        }

        if !self.seen.insert(finding.dedup_key()) {
            tracing::trace!(text = finding.text, engine = finding.engine, "Duplicate dropped");
            self.counts.deduplicated += 1;
            return Ok(());
        }

        self.writer.write_finding(&finding)?;
        self.counts.written += 1;
        Ok(())
    }

    /// Counters so far. Taken before `close` to build the summary.
    pub fn counts(&self) -> MatchCounts {
        self.counts
    }

    /// True when the writer streams rows as they arrive.
    pub fn is_streaming(&self) -> bool {
        self.writer.mode() == WriteMode::RowStreaming
    }

    /// Hand the summary to the writer and finalise it. Idempotent; the
    /// writer is finalised exactly once.
    pub fn close(&mut self, summary: &Summary) -> Result<(), WriterError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.write_summary(summary)?;
        self.writer.close()
    }
}

impl std::fmt::Debug for MatchContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchContainer")
            .field("counts", &self.counts)
            .field("closed", &self.closed)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
