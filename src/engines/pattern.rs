// piiscan - engines/pattern.rs
//
// The pattern engine: one compiled alternation whose capture groups map
// positionally to type labels. Credit-card candidates must pass the Luhn
// checksum; failing candidates are discarded, not re-labelled.

use super::DetectionEngine;
use crate::core::model::{Concurrency, EngineMatch};
use crate::core::patterns::CompiledPatterns;
use crate::util::constants;
use crate::util::error::EngineError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Regex-based detection engine. Stateless.
pub struct PatternEngine {
    patterns: Arc<CompiledPatterns>,
}

impl PatternEngine {
    pub fn new(patterns: Arc<CompiledPatterns>) -> Self {
        Self { patterns }
    }
}

impl DetectionEngine for PatternEngine {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::Stateless
    }

    fn is_available(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn detect(&self, text: &str) -> Result<Vec<EngineMatch>, EngineError> {
        let mut matches = Vec::new();
        for caps in self.patterns.combined.captures_iter(text) {
            let Some(label) = self.patterns.label_for(&caps) else {
                continue;
            };
            let Some(surface) = self.patterns.captured_text(&caps) else {
                continue;
            };
            if label == constants::CREDIT_CARD_LABEL && !luhn_valid(surface) {
                tracing::trace!(candidate = surface, "Luhn check failed, candidate discarded");
                continue;
            }
            matches.push(EngineMatch {
                text: surface.to_string(),
                label: label.to_string(),
                confidence: None,
                metadata: BTreeMap::new(),
            });
        }
        Ok(matches)
    }
}

/// Luhn (mod 10) checksum over the digits of `candidate`. Separator
/// characters are ignored; anything shorter than 12 digits fails.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 12 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patterns;

    fn engine() -> PatternEngine {
        PatternEngine::new(Arc::new(patterns::load_builtin().unwrap()))
    }

    #[test]
    fn test_email_and_iban() {
        let matches = engine()
            .detect("Contact u@example.com; IBAN DE89370400440532013000.")
            .unwrap();
        let pairs: Vec<(String, String)> = matches
            .iter()
            .map(|m| (m.label.clone(), m.text.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("email".to_string(), "u@example.com".to_string()),
                ("iban".to_string(), "DE89370400440532013000".to_string()),
            ]
        );
        assert!(matches.iter().all(|m| m.confidence.is_none()));
    }

    #[test]
    fn test_luhn_gate_on_credit_cards() {
        let matches = engine()
            .detect("valid 4111-1111-1111-1111 invalid 4111-1111-1111-1112")
            .unwrap();
        let cards: Vec<&str> = matches
            .iter()
            .filter(|m| m.label == "credit_card")
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(cards, vec!["4111-1111-1111-1111"]);
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("4111-1111-1111-1111"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("411"), "too short");
    }

    #[test]
    fn test_non_overlapping_matches() {
        let matches = engine().detect("a@b.de c@d.de").unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_ip_address() {
        let matches = engine().detect("host 192.168.1.77 responded").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].label, "ip_address");
        assert_eq!(matches[0].text, "192.168.1.77");
    }

    #[test]
    fn test_plain_prose_matches_nothing() {
        assert!(engine()
            .detect("The quick brown fox jumps over the lazy dog.")
            .unwrap()
            .is_empty());
    }
}
