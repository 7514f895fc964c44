// piiscan - engines/mod.rs
//
// Detection engine contract and the engine registry (the processor).
//
// Engines are instantiated once per run and invoked per text chunk in a
// stable configured order, so the finding stream is deterministic for a
// fixed input and engine set. Each engine declares its concurrency
// discipline; the registry wraps calls to requires-exclusive engines in
// an engine-local mutex. Engine failures and panics are contained per
// engine per chunk: the error is counted and the remaining engines and
// chunks proceed.

pub mod gliner;
pub mod llm;
pub mod multimodal;
pub mod ner_model;
pub mod pattern;
pub mod spacy;

use crate::core::matches::MatchContainer;
use crate::core::model::{Concurrency, EngineMatch, TextContent};
use crate::core::stats::Statistics;
use crate::util::constants;
use crate::util::error::{EngineError, ErrorKind, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

// =============================================================================
// Engine contract
// =============================================================================

/// A detection method: consumes a text chunk, returns zero or more typed
/// matches. `detect` must be pure with respect to the engine's
/// configuration and must not mutate shared state.
pub trait DetectionEngine: Send + Sync {
    /// Stable identifier, recorded as finding provenance.
    fn name(&self) -> &'static str;

    /// Concurrency discipline; consulted by the registry.
    fn concurrency(&self) -> Concurrency;

    /// One-shot readiness check (model loaded, endpoint reachable, key
    /// present). Called once at context build.
    fn is_available(&self) -> std::result::Result<(), EngineError>;

    /// Detect entities in one chunk.
    fn detect(&self, text: &str) -> std::result::Result<Vec<EngineMatch>, EngineError>;

    /// True for engines that consume image files instead of text.
    fn handles_images(&self) -> bool {
        false
    }

    /// Detect entities in an image file. Only called when
    /// `handles_images` is true.
    fn detect_image(&self, _path: &Path) -> std::result::Result<Vec<EngineMatch>, EngineError> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Registry / processor
// =============================================================================

struct EngineSlot {
    engine: Box<dyn DetectionEngine>,

    /// Present for requires-exclusive engines; held across each `detect`.
    guard: Option<Mutex<()>>,
}

/// Owns the enabled engines and drives them over extracted text.
pub struct EngineRegistry {
    slots: Vec<EngineSlot>,
}

impl EngineRegistry {
    /// Build the registry over the enabled engines, in configured order.
    pub fn new(engines: Vec<Box<dyn DetectionEngine>>) -> Self {
        let slots = engines
            .into_iter()
            .map(|engine| {
                let guard = match engine.concurrency() {
                    Concurrency::RequiresExclusive => Some(Mutex::new(())),
                    Concurrency::Stateless | Concurrency::ExternalSerialized => None,
                };
                EngineSlot { engine, guard }
            })
            .collect();
        Self { slots }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.engine.name()).collect()
    }

    /// True when an image-capable engine is enabled.
    pub fn handles_images(&self) -> bool {
        self.slots.iter().any(|s| s.engine.handles_images())
    }

    /// Run all engines over every chunk of `content`, stamping findings
    /// with `path` and the engine name and handing each chunk's batch to
    /// the container under its single write lock.
    ///
    /// A chunk that fails to extract aborts the remainder of the file (the
    /// extraction error is counted); an engine that fails or panics is
    /// skipped for that chunk only.
    pub fn process(
        &self,
        path: &PathBuf,
        content: TextContent,
        container: &Mutex<MatchContainer>,
        stats: &Statistics,
    ) -> Result<()> {
        match content {
            TextContent::Text(text) => self.process_chunk(path, &text, container, stats),
            TextContent::Chunks(chunks) => {
                for chunk in chunks.take(constants::MAX_CHUNKS_PER_FILE) {
                    match chunk {
                        Ok(text) => self.process_chunk(path, &text, container, stats)?,
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "Chunk extraction failed");
                            stats.record_error(ErrorKind::Extraction, path);
                            break;
                        }
                    }
                }
                Ok(())
            }
            TextContent::Image => self.process_image(path, container, stats),
        }
    }

    fn process_chunk(
        &self,
        path: &PathBuf,
        text: &str,
        container: &Mutex<MatchContainer>,
        stats: &Statistics,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let mut batch = Vec::new();
        for slot in &self.slots {
            if slot.engine.handles_images() {
                continue;
            }
            let matches = self.invoke(slot, stats, path, || slot.engine.detect(text));
            let engine = slot.engine.name();
            batch.extend(matches.into_iter().map(|m| m.into_finding(path, engine)));
        }
        self.commit(batch, container, stats)
    }

    fn process_image(
        &self,
        path: &PathBuf,
        container: &Mutex<MatchContainer>,
        stats: &Statistics,
    ) -> Result<()> {
        if !self.handles_images() {
            tracing::debug!(path = %path.display(), "No multimodal engine enabled, image skipped");
            return Ok(());
        }
        let mut batch = Vec::new();
        for slot in self.slots.iter().filter(|s| s.engine.handles_images()) {
            let matches = self.invoke(slot, stats, path, || slot.engine.detect_image(path));
            let engine = slot.engine.name();
            batch.extend(matches.into_iter().map(|m| m.into_finding(path, engine)));
        }
        self.commit(batch, container, stats)
    }

    /// Invoke one engine call with timing, mutex discipline, and panic
    /// containment. Failures return an empty match list after counting.
    fn invoke<F>(
        &self,
        slot: &EngineSlot,
        stats: &Statistics,
        path: &Path,
        call: F,
    ) -> Vec<EngineMatch>
    where
        F: FnOnce() -> std::result::Result<Vec<EngineMatch>, EngineError>,
    {
        let _guard = slot.guard.as_ref().map(|g| g.lock().expect("engine mutex poisoned"));
        let engine = slot.engine.name();
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(call));
        stats.record_engine(engine, started.elapsed());

        match outcome {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::warn!(engine, path = %path.display(), error = %e, "Engine failed on chunk");
                stats.record_error(ErrorKind::Engine, path);
                Vec::new()
            }
            Err(_) => {
                tracing::error!(engine, path = %path.display(), "Engine panicked on chunk");
                stats.record_error(ErrorKind::Engine, path);
                Vec::new()
            }
        }
    }

    fn commit(
        &self,
        batch: Vec<crate::core::model::Finding>,
        container: &Mutex<MatchContainer>,
        stats: &Statistics,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        stats.record_detected(batch.len() as u64);
        let mut container = container.lock().expect("match container poisoned");
        for finding in batch {
            container.add(finding)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.engine_names())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matches::MatchContainer;
    use crate::core::model::Finding;
    use crate::core::stats::Summary;
    use crate::core::writers::{FindingsWriter, WriteMode};
    use crate::util::error::WriterError;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct SinkWriter {
        rows: Arc<Mutex<Vec<Finding>>>,
    }

    impl FindingsWriter for SinkWriter {
        fn mode(&self) -> WriteMode {
            WriteMode::RowStreaming
        }
        fn write_finding(&mut self, finding: &Finding) -> std::result::Result<(), WriterError> {
            self.rows.lock().unwrap().push(finding.clone());
            Ok(())
        }
        fn write_summary(&mut self, _: &Summary) -> std::result::Result<(), WriterError> {
            Ok(())
        }
        fn close(&mut self) -> std::result::Result<(), WriterError> {
            Ok(())
        }
    }

    fn sink() -> (Mutex<MatchContainer>, Arc<Mutex<Vec<Finding>>>) {
        let rows = Arc::new(Mutex::new(Vec::new()));
        let container = MatchContainer::new(None, Box::new(SinkWriter { rows: rows.clone() }));
        (Mutex::new(container), rows)
    }

    struct FixedEngine {
        name: &'static str,
        texts: Vec<&'static str>,
    }

    impl DetectionEngine for FixedEngine {
        fn name(&self) -> &'static str {
            self.name
        }
        fn concurrency(&self) -> Concurrency {
            Concurrency::Stateless
        }
        fn is_available(&self) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        fn detect(&self, _text: &str) -> std::result::Result<Vec<EngineMatch>, EngineError> {
            Ok(self
                .texts
                .iter()
                .map(|t| EngineMatch {
                    text: t.to_string(),
                    label: "person".to_string(),
                    confidence: Some(0.9),
                    metadata: BTreeMap::new(),
                })
                .collect())
        }
    }

    struct PanickingEngine;

    impl DetectionEngine for PanickingEngine {
        fn name(&self) -> &'static str {
            "panicky"
        }
        fn concurrency(&self) -> Concurrency {
            Concurrency::Stateless
        }
        fn is_available(&self) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        fn detect(&self, _text: &str) -> std::result::Result<Vec<EngineMatch>, EngineError> {
            panic!("boom");
        }
    }

    #[test]
    fn test_engine_order_is_stable() {
        let registry = EngineRegistry::new(vec![
            Box::new(FixedEngine {
                name: "first",
                texts: vec!["a"],
            }),
            Box::new(FixedEngine {
                name: "second",
                texts: vec!["b"],
            }),
        ]);
        let (container, rows) = sink();
        let stats = Statistics::new();
        registry
            .process(
                &PathBuf::from("/scan/x.txt"),
                TextContent::Text("chunk".to_string()),
                &container,
                &stats,
            )
            .unwrap();

        let engines: Vec<String> = rows.lock().unwrap().iter().map(|f| f.engine.clone()).collect();
        assert_eq!(engines, vec!["first", "second"]);
    }

    #[test]
    fn test_panicking_engine_does_not_block_others() {
        let registry = EngineRegistry::new(vec![
            Box::new(PanickingEngine),
            Box::new(FixedEngine {
                name: "steady",
                texts: vec!["survivor"],
            }),
        ]);
        let (container, rows) = sink();
        let stats = Statistics::new();
        let path = PathBuf::from("/scan/x.txt");

        // Two chunks: the panic on the first must not poison the second.
        let chunks: crate::core::model::ChunkIter = Box::new(
            vec![Ok("one".to_string()), Ok("two".to_string())].into_iter(),
        );
        registry
            .process(&path, TextContent::Chunks(chunks), &container, &stats)
            .unwrap();

        assert_eq!(rows.lock().unwrap().len(), 2, "steady engine ran on both chunks");
        assert_eq!(stats.error_count(ErrorKind::Engine), 2);
    }

    #[test]
    fn test_extraction_error_chunk_aborts_file_but_counts() {
        let registry = EngineRegistry::new(vec![Box::new(FixedEngine {
            name: "steady",
            texts: vec!["m"],
        })]);
        let (container, rows) = sink();
        let stats = Statistics::new();
        let path = PathBuf::from("/scan/broken.pdf");

        let chunks: crate::core::model::ChunkIter = Box::new(
            vec![
                Ok("good page".to_string()),
                Err(crate::util::error::ExtractError::Decode {
                    path: path.clone(),
                    format: "pdf",
                    reason: "truncated".to_string(),
                }),
                Ok("never reached".to_string()),
            ]
            .into_iter(),
        );
        registry
            .process(&path, TextContent::Chunks(chunks), &container, &stats)
            .unwrap();

        assert_eq!(rows.lock().unwrap().len(), 1, "only the first chunk processed");
        assert_eq!(stats.error_count(ErrorKind::Extraction), 1);
    }

    #[test]
    fn test_image_without_multimodal_engine_is_skipped() {
        let registry = EngineRegistry::new(vec![Box::new(FixedEngine {
            name: "textual",
            texts: vec!["m"],
        })]);
        let (container, rows) = sink();
        let stats = Statistics::new();
        registry
            .process(
                &PathBuf::from("/scan/photo.png"),
                TextContent::Image,
                &container,
                &stats,
            )
            .unwrap();
        assert!(rows.lock().unwrap().is_empty());
    }
}
