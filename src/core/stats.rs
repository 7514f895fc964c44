// piiscan - core/stats.rs
//
// Run statistics: monotonic counters under fine-grained locking, frozen
// into an immutable `Summary` snapshot at run end. Counters use atomics;
// histogram and timestamp updates take a mutex. Engines never see live
// statistics; only the final snapshot is exposed.

use crate::util::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// =============================================================================
// Live statistics
// =============================================================================

/// Per-engine invocation counters.
#[derive(Debug, Clone, Copy, Default)]
struct EngineTiming {
    invocations: u64,
    total: Duration,
}

/// Live run counters. Created at run start, frozen at run end.
#[derive(Debug)]
pub struct Statistics {
    started_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,

    files_discovered: AtomicU64,
    files_analyzed: AtomicU64,
    findings_detected: AtomicU64,

    extensions: Mutex<BTreeMap<String, u64>>,
    errors: Mutex<BTreeMap<ErrorKind, u64>>,
    engines: Mutex<BTreeMap<String, EngineTiming>>,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: Mutex::new(None),
            files_discovered: AtomicU64::new(0),
            files_analyzed: AtomicU64::new(0),
            findings_detected: AtomicU64::new(0),
            extensions: Mutex::new(BTreeMap::new()),
            errors: Mutex::new(BTreeMap::new()),
            engines: Mutex::new(BTreeMap::new()),
        }
    }

    /// A file was seen by the walker, before validation.
    pub fn record_discovered(&self) {
        self.files_discovered.fetch_add(1, Ordering::Relaxed);
    }

    /// A file passed validation and has a processor.
    pub fn record_analyzed(&self, extension: &str) {
        self.files_analyzed.fetch_add(1, Ordering::Relaxed);
        let key = if extension.is_empty() {
            "<none>".to_string()
        } else {
            extension.to_string()
        };
        let mut map = self.extensions.lock().expect("extension histogram poisoned");
        *map.entry(key).or_insert(0) += 1;
    }

    /// Engines produced `count` matches for one chunk.
    pub fn record_detected(&self, count: u64) {
        self.findings_detected.fetch_add(count, Ordering::Relaxed);
    }

    /// A recoverable failure attached to `path`.
    pub fn record_error(&self, kind: ErrorKind, path: &Path) {
        tracing::debug!(kind = %kind, path = %path.display(), "Recoverable error counted");
        let mut map = self.errors.lock().expect("error histogram poisoned");
        *map.entry(kind).or_insert(0) += 1;
    }

    /// One engine invocation completed in `elapsed`.
    pub fn record_engine(&self, engine: &str, elapsed: Duration) {
        let mut map = self.engines.lock().expect("engine histogram poisoned");
        let timing = map.entry(engine.to_string()).or_default();
        timing.invocations += 1;
        timing.total += elapsed;
    }

    /// Number of files analysed so far (used for the stop-count check).
    pub fn analyzed_count(&self) -> u64 {
        self.files_analyzed.load(Ordering::Relaxed)
    }

    /// Total errors of one kind recorded so far.
    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        *self
            .errors
            .lock()
            .expect("error histogram poisoned")
            .get(&kind)
            .unwrap_or(&0)
    }

    /// Mark the run as finished. Idempotent; the first call wins.
    pub fn freeze(&self) {
        let mut finished = self.finished_at.lock().expect("finish timestamp poisoned");
        if finished.is_none() {
            *finished = Some(Utc::now());
        }
    }

    /// Immutable snapshot for the summary. `counts` comes from the match
    /// container, which owns the whitelist/dedup/written counters.
    pub fn snapshot(&self, counts: MatchCounts) -> Summary {
        let finished_at = self
            .finished_at
            .lock()
            .expect("finish timestamp poisoned")
            .unwrap_or_else(Utc::now);
        let duration = (finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let files_analyzed = self.files_analyzed.load(Ordering::Relaxed);

        let errors: BTreeMap<String, u64> = self
            .errors
            .lock()
            .expect("error histogram poisoned")
            .iter()
            .map(|(k, v)| (k.label().to_string(), *v))
            .collect();
        let errors_total = errors.values().sum();

        let engines = self
            .engines
            .lock()
            .expect("engine histogram poisoned")
            .iter()
            .map(|(name, t)| {
                let total_ms = t.total.as_secs_f64() * 1_000.0;
                (
                    name.clone(),
                    EngineSummary {
                        invocations: t.invocations,
                        total_ms,
                        mean_ms: if t.invocations > 0 {
                            total_ms / t.invocations as f64
                        } else {
                            0.0
                        },
                    },
                )
            })
            .collect();

        let secs = duration.as_secs_f64();
        Summary {
            started_at: self.started_at,
            finished_at,
            duration_secs: secs,
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            files_analyzed,
            files_per_second: if secs > 0.0 {
                files_analyzed as f64 / secs
            } else {
                0.0
            },
            findings_detected: self.findings_detected.load(Ordering::Relaxed),
            matches: counts.written,
            whitelisted: counts.whitelisted,
            deduplicated: counts.deduplicated,
            errors_total,
            errors,
            extensions: self
                .extensions
                .lock()
                .expect("extension histogram poisoned")
                .clone(),
            engines,
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Match container counters (reported into the summary)
// =============================================================================

/// Counters owned by the match container. Invariant:
/// `added == written + whitelisted + deduplicated`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchCounts {
    pub added: u64,
    pub whitelisted: u64,
    pub deduplicated: u64,
    pub written: u64,
}

// =============================================================================
// Summary snapshot
// =============================================================================

/// Per-engine summary entry.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    pub invocations: u64,
    pub total_ms: f64,
    pub mean_ms: f64,
}

/// Frozen run summary, consumed by document writers and the console.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub files_discovered: u64,
    pub files_analyzed: u64,
    pub files_per_second: f64,
    pub findings_detected: u64,
    pub matches: u64,
    pub whitelisted: u64,
    pub deduplicated: u64,
    pub errors_total: u64,
    pub errors: BTreeMap<String, u64>,
    pub extensions: BTreeMap<String, u64>,
    pub engines: BTreeMap<String, EngineSummary>,
}

impl Summary {
    /// Human-readable text block for the console.
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        out.push_str("Scan summary\n");
        out.push_str("------------\n");
        out.push_str(&format!(
            "  duration          {:.2}s ({:.1} files/s)\n",
            self.duration_secs, self.files_per_second
        ));
        out.push_str(&format!(
            "  files             {} discovered, {} analysed\n",
            self.files_discovered, self.files_analyzed
        ));
        out.push_str(&format!(
            "  matches           {} written ({} whitelisted, {} duplicates dropped)\n",
            self.matches, self.whitelisted, self.deduplicated
        ));
        out.push_str(&format!("  errors            {}\n", self.errors_total));
        for (kind, count) in &self.errors {
            out.push_str(&format!("    {kind:<16}{count}\n"));
        }
        if !self.extensions.is_empty() {
            out.push_str("  extensions\n");
            for (ext, count) in &self.extensions {
                out.push_str(&format!("    {ext:<16}{count}\n"));
            }
        }
        if !self.engines.is_empty() {
            out.push_str("  engines\n");
            for (name, e) in &self.engines {
                out.push_str(&format!(
                    "    {name:<16}{} calls, {:.1}ms mean\n",
                    e.invocations, e.mean_ms
                ));
            }
        }
        out
    }

    /// Machine-readable JSON rendering. Identical fields, different encoding.
    pub fn render_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
