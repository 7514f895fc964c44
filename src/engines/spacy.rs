// piiscan - engines/spacy.rs
//
// The pipeline NER engine: a conventionally-tagged token-classification
// pipeline (PER/LOC/ORG tag set). Pipeline tags are translated into the
// configured label set; tags outside the mapping are surfaced under an
// engine-prefixed label so they stay visible for diagnostics.

use super::ner_model::TokenClassifier;
use super::DetectionEngine;
use crate::core::model::{Concurrency, EngineMatch};
use crate::core::patterns::CompiledPatterns;
use crate::util::error::EngineError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Pipeline-tag NER engine. Serialised by the registry.
pub struct PipelineNerEngine {
    classifier: TokenClassifier,
    patterns: Arc<CompiledPatterns>,
    threshold: f64,
}

impl PipelineNerEngine {
    pub fn new(
        model_dir: &Path,
        threshold: f64,
        patterns: Arc<CompiledPatterns>,
    ) -> Result<Self, EngineError> {
        let classifier = TokenClassifier::load("spacy", model_dir)?;
        Ok(Self {
            classifier,
            patterns,
            threshold,
        })
    }
}

/// Translate a pipeline entity tag into the configured label vocabulary.
/// Returns `None` for tags with no conventional mapping.
fn translate_tag(tag: &str) -> Option<&'static str> {
    match tag.to_ascii_uppercase().as_str() {
        "PER" | "PERSON" => Some("person"),
        "LOC" | "GPE" => Some("location"),
        "ORG" => Some("organization"),
        "FAC" | "ADDRESS" => Some("address"),
        _ => None,
    }
}

impl DetectionEngine for PipelineNerEngine {
    fn name(&self) -> &'static str {
        "spacy"
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::RequiresExclusive
    }

    fn is_available(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn detect(&self, text: &str) -> Result<Vec<EngineMatch>, EngineError> {
        let entities = self.classifier.predict("spacy", text, self.threshold)?;

        let mut matches = Vec::new();
        for entity in entities {
            let label = match translate_tag(&entity.tag) {
                // Translated tags still have to be part of the configured
                // vocabulary.
                Some(label) if self.patterns.is_known_label(label) => label.to_string(),
                _ => format!("spacy:{}", entity.tag),
            };
            let mut metadata = BTreeMap::new();
            metadata.insert("tag".to_string(), entity.tag.clone());
            matches.push(EngineMatch {
                text: entity.text,
                label,
                confidence: Some(entity.score),
                metadata,
            });
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_tags_translate() {
        assert_eq!(translate_tag("PER"), Some("person"));
        assert_eq!(translate_tag("person"), Some("person"));
        assert_eq!(translate_tag("GPE"), Some("location"));
        assert_eq!(translate_tag("ORG"), Some("organization"));
        assert_eq!(translate_tag("MISC"), None);
    }
}
