// piiscan - engines/gliner.rs
//
// The AI-NER engine: a label-conditioned span model (GLiNER-class) run
// through the shared ONNX token-classifier. Only entities whose tag maps
// into the configured NER label table are emitted; everything else is the
// pipeline engine's business.

use super::ner_model::TokenClassifier;
use super::DetectionEngine;
use crate::core::model::{Concurrency, EngineMatch};
use crate::core::patterns::CompiledPatterns;
use crate::util::error::EngineError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Model-backed AI-NER engine. The underlying runtime is not safe for
/// concurrent invocation; the registry serialises calls.
pub struct AiNerEngine {
    classifier: TokenClassifier,
    patterns: Arc<CompiledPatterns>,
    threshold: f64,
}

impl AiNerEngine {
    /// Load the model from `model_dir`. Failure means the engine is
    /// unavailable; the caller decides whether that is fatal.
    pub fn new(
        model_dir: &Path,
        threshold: f64,
        patterns: Arc<CompiledPatterns>,
    ) -> Result<Self, EngineError> {
        let classifier = TokenClassifier::load("gliner", model_dir)?;
        Ok(Self {
            classifier,
            patterns,
            threshold,
        })
    }
}

impl DetectionEngine for AiNerEngine {
    fn name(&self) -> &'static str {
        "gliner"
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::RequiresExclusive
    }

    fn is_available(&self) -> Result<(), EngineError> {
        // Construction already loaded the model.
        Ok(())
    }

    fn detect(&self, text: &str) -> Result<Vec<EngineMatch>, EngineError> {
        let entities = self.classifier.predict("gliner", text, self.threshold)?;

        let mut matches = Vec::new();
        for entity in entities {
            // The model is prompted with the configured terms; map the tag
            // back through the label table and drop anything outside it.
            let term = entity.tag.to_lowercase();
            let Some(label) = self.patterns.label_for_term(&term) else {
                tracing::trace!(tag = entity.tag, "Unconfigured tag dropped");
                continue;
            };
            let mut metadata = BTreeMap::new();
            metadata.insert("term".to_string(), term.clone());
            matches.push(EngineMatch {
                text: entity.text,
                label: label.to_string(),
                confidence: Some(entity.score),
                metadata,
            });
        }
        Ok(matches)
    }
}
