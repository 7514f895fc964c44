// piiscan - engines/ner_model.rs
//
// Shared ONNX token-classification wrapper used by the model-backed NER
// engines. Pure-Rust inference path: tokenizers for the vocabulary,
// tract for the ONNX graph. The graph is optimised for a fixed sequence
// length; longer inputs are segmented before encoding and each segment
// is padded to the model length.
//
// The underlying plan is not safe for concurrent invocation; callers
// (the engine registry) serialise access behind the engine's mutex.

use crate::util::error::EngineError;
use std::path::Path;
use tract_onnx::prelude::*;

/// Model sequence length. Inputs are truncated/padded to this many tokens.
const MAX_SEQ_LEN: usize = 256;

/// Character budget per text segment fed to the tokenizer. Keeps most
/// segments under the token budget so little text is lost to truncation.
const MAX_SEGMENT_CHARS: usize = 1_000;

type Plan = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// One recognised entity span.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Exact surface form from the input segment.
    pub text: String,

    /// Model tag with any B-/I- prefix stripped (e.g. "PER", "person").
    pub tag: String,

    /// Mean token probability over the span, in [0, 1].
    pub score: f64,
}

/// A loaded token-classification pipeline.
pub struct TokenClassifier {
    tokenizer: tokenizers::Tokenizer,
    plan: Plan,
    takes_token_types: bool,
    id2label: Vec<String>,
}

impl std::fmt::Debug for TokenClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenClassifier")
            .field("takes_token_types", &self.takes_token_types)
            .field("id2label", &self.id2label)
            .finish_non_exhaustive()
    }
}

impl TokenClassifier {
    /// Load `model.onnx`, `tokenizer.json`, and `config.json` (for the
    /// id2label table) from `model_dir`.
    pub fn load(engine: &'static str, model_dir: &Path) -> Result<Self, EngineError> {
        let unavailable = |reason: String| EngineError::Unavailable { engine, reason };

        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let config_path = model_dir.join("config.json");
        for required in [&model_path, &tokenizer_path, &config_path] {
            if !required.exists() {
                return Err(unavailable(format!("missing {}", required.display())));
            }
        }

        let mut tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| unavailable(format!("tokenizer load failed: {e}")))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| unavailable(format!("tokenizer truncation setup failed: {e}")))?;

        let id2label = load_id2label(&config_path)
            .map_err(|reason| unavailable(format!("config.json: {reason}")))?;

        let mut model = tract_onnx::onnx()
            .model_for_path(&model_path)
            .map_err(|e| unavailable(format!("model load failed: {e}")))?;
        let input_count = model
            .input_outlets()
            .map(|outlets| outlets.len())
            .map_err(|e| unavailable(format!("model inputs unreadable: {e}")))?;
        let fact = InferenceFact::dt_shape(i64::datum_type(), tvec!(1, MAX_SEQ_LEN));
        for input in 0..input_count {
            model = model
                .with_input_fact(input, fact.clone())
                .map_err(|e| unavailable(format!("input fact rejected: {e}")))?;
        }
        let plan = model
            .into_optimized()
            .and_then(|m| m.into_runnable())
            .map_err(|e| unavailable(format!("model optimisation failed: {e}")))?;

        tracing::info!(
            engine,
            model = %model_path.display(),
            labels = id2label.len(),
            "NER model loaded"
        );
        Ok(Self {
            tokenizer,
            plan,
            takes_token_types: input_count >= 3,
            id2label,
        })
    }

    /// Recognise entities in `text`, keeping spans whose mean probability
    /// reaches `threshold`.
    pub fn predict(
        &self,
        engine: &'static str,
        text: &str,
        threshold: f64,
    ) -> Result<Vec<Entity>, EngineError> {
        let mut entities = Vec::new();
        for segment in segments(text) {
            entities.extend(self.predict_segment(engine, segment, threshold)?);
        }
        Ok(entities)
    }

    fn predict_segment(
        &self,
        engine: &'static str,
        segment: &str,
        threshold: f64,
    ) -> Result<Vec<Entity>, EngineError> {
        let detection = |reason: String| EngineError::Detection { engine, reason };

        let encoding = self
            .tokenizer
            .encode(segment, true)
            .map_err(|e| detection(format!("tokenisation failed: {e}")))?;
        let ids = encoding.get_ids();
        let offsets = encoding.get_offsets();
        let token_count = ids.len().min(MAX_SEQ_LEN);
        if token_count == 0 {
            return Ok(Vec::new());
        }

        let mut input_ids = tract_ndarray::Array2::<i64>::zeros((1, MAX_SEQ_LEN));
        let mut attention_mask = tract_ndarray::Array2::<i64>::zeros((1, MAX_SEQ_LEN));
        for i in 0..token_count {
            input_ids[[0, i]] = i64::from(ids[i]);
            attention_mask[[0, i]] = 1;
        }

        let mut inputs: TVec<TValue> = tvec!(
            Tensor::from(input_ids).into(),
            Tensor::from(attention_mask).into()
        );
        if self.takes_token_types {
            inputs.push(Tensor::from(tract_ndarray::Array2::<i64>::zeros((1, MAX_SEQ_LEN))).into());
        }

        let outputs = self
            .plan
            .run(inputs)
            .map_err(|e| detection(format!("inference failed: {e}")))?;
        let logits = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| detection(format!("unexpected output tensor: {e}")))?;
        if logits.ndim() != 3 {
            return Err(detection(format!(
                "expected [batch, seq, labels] logits, got {} dims",
                logits.ndim()
            )));
        }

        let mut decoder = SpanDecoder::new(segment, threshold);
        for token in 0..token_count {
            let (start, end) = offsets[token];
            if start == end {
                // Special tokens carry no source span.
                continue;
            }
            let scores: Vec<f32> = (0..self.id2label.len())
                .map(|l| logits[[0, token, l]])
                .collect();
            let (best, prob) = softmax_argmax(&scores);
            decoder.push(&self.id2label[best], prob, start, end);
        }
        Ok(decoder.finish())
    }
}

/// BIO span grouping with threshold filtering.
struct SpanDecoder<'a> {
    segment: &'a str,
    threshold: f64,
    current: Option<(String, usize, usize, Vec<f64>)>,
    entities: Vec<Entity>,
}

impl<'a> SpanDecoder<'a> {
    fn new(segment: &'a str, threshold: f64) -> Self {
        Self {
            segment,
            threshold,
            current: None,
            entities: Vec::new(),
        }
    }

    fn push(&mut self, label: &str, prob: f64, start: usize, end: usize) {
        if label == "O" {
            self.flush();
            return;
        }
        let (prefix, tag) = match label.split_once('-') {
            Some((p, t)) if p == "B" || p == "I" => (p, t),
            // Tag sets without BIO prefixes ("person", "PER") continue the
            // current span when the tag repeats.
            _ => ("I", label),
        };

        match &mut self.current {
            Some((tag0, _, end0, scores)) if prefix == "I" && tag0 == tag => {
                *end0 = end;
                scores.push(prob);
            }
            _ => {
                self.flush();
                self.current = Some((tag.to_string(), start, end, vec![prob]));
            }
        }
    }

    fn flush(&mut self) {
        let Some((tag, start, end, scores)) = self.current.take() else {
            return;
        };
        let score = scores.iter().sum::<f64>() / scores.len() as f64;
        if score < self.threshold {
            return;
        }
        let Some(surface) = self.segment.get(start..end) else {
            return;
        };
        let surface = surface.trim();
        if surface.is_empty() {
            return;
        }
        self.entities.push(Entity {
            text: surface.to_string(),
            tag,
            score,
        });
    }

    fn finish(mut self) -> Vec<Entity> {
        self.flush();
        self.entities
    }
}

/// Softmax followed by argmax; returns (index, probability).
fn softmax_argmax(scores: &[f32]) -> (usize, f64) {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = scores.iter().map(|s| f64::from(s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    let (best, _) = scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bs), (i, &s)| {
            if s > bs {
                (i, s)
            } else {
                (bi, bs)
            }
        });
    (best, exps[best] / sum)
}

/// Split `text` into newline-aligned segments of bounded size so the
/// fixed-length model sees (almost) everything.
fn segments(text: &str) -> Vec<&str> {
    if text.len() <= MAX_SEGMENT_CHARS {
        return vec![text];
    }
    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let tentative = (start + MAX_SEGMENT_CHARS).min(text.len());
        let end = if tentative == text.len() {
            tentative
        } else {
            // Prefer breaking at a newline inside the window; otherwise
            // back off to a char boundary.
            text[start..tentative]
                .rfind('\n')
                .map(|p| start + p + 1)
                .unwrap_or_else(|| {
                    let mut e = tentative;
                    while !text.is_char_boundary(e) {
                        e -= 1;
                    }
                    e
                })
        };
        if end == start {
            break;
        }
        out.push(&text[start..end]);
        start = end;
    }
    out
}

/// Parse the `id2label` table of a transformer `config.json`.
fn load_id2label(path: &Path) -> Result<Vec<String>, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    let table = value
        .get("id2label")
        .and_then(|v| v.as_object())
        .ok_or_else(|| "missing id2label table".to_string())?;

    let mut pairs: Vec<(usize, String)> = Vec::with_capacity(table.len());
    for (key, label) in table {
        let id = key
            .parse::<usize>()
            .map_err(|_| format!("non-numeric label id '{key}'"))?;
        let label = label
            .as_str()
            .ok_or_else(|| format!("non-string label for id {id}"))?;
        pairs.push((id, label.to_string()));
    }
    pairs.sort();
    Ok(pairs.into_iter().map(|(_, label)| label).collect())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_argmax_prefers_largest() {
        let (idx, prob) = softmax_argmax(&[0.1, 3.0, 0.2]);
        assert_eq!(idx, 1);
        assert!(prob > 0.8, "dominant logit gets most of the mass: {prob}");
    }

    #[test]
    fn test_segments_cover_whole_text() {
        let text = "line one\n".repeat(400);
        let parts = segments(&text);
        assert!(parts.len() > 1);
        assert_eq!(parts.concat(), text, "no characters lost");
    }

    #[test]
    fn test_span_decoder_groups_bio_runs() {
        let segment = "Anna Marie Smith lives here";
        let mut decoder = SpanDecoder::new(segment, 0.5);
        decoder.push("B-PER", 0.9, 0, 4);
        decoder.push("I-PER", 0.8, 5, 10);
        decoder.push("I-PER", 0.85, 11, 16);
        decoder.push("O", 0.99, 17, 22);
        let entities = decoder.finish();

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Anna Marie Smith");
        assert_eq!(entities[0].tag, "PER");
        assert!((entities[0].score - 0.85).abs() < 0.01);
    }

    #[test]
    fn test_span_decoder_threshold_drops_weak_spans() {
        let segment = "maybe Berlin";
        let mut decoder = SpanDecoder::new(segment, 0.7);
        decoder.push("B-LOC", 0.4, 6, 12);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_span_decoder_unprefixed_tags() {
        let segment = "Anna Smith";
        let mut decoder = SpanDecoder::new(segment, 0.5);
        decoder.push("person", 0.9, 0, 4);
        decoder.push("person", 0.9, 5, 10);
        let entities = decoder.finish();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Anna Smith");
        assert_eq!(entities[0].tag, "person");
    }

    #[test]
    fn test_load_id2label_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"id2label": {"2": "B-LOC", "0": "O", "1": "B-PER"}}"#,
        )
        .unwrap();
        assert_eq!(load_id2label(&path).unwrap(), vec!["O", "B-PER", "B-LOC"]);
    }

    #[test]
    fn test_missing_model_dir_is_unavailable() {
        let err = TokenClassifier::load("gliner", Path::new("/nonexistent/model")).unwrap_err();
        assert!(matches!(err, EngineError::Unavailable { .. }));
    }
}
