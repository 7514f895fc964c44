// piiscan - engines/llm.rs
//
// LLM-backed detection against an OpenAI-compatible chat-completions
// endpoint (a local Ollama server or a hosted API). The engine sends a
// fixed extraction prompt plus the chunk and the label list, parses the
// JSON reply, and returns an empty list when the reply does not parse.
//
// Network discipline: per-call timeout, at-most-N concurrent outbound
// requests (internal counting semaphore), and adaptive rate limiting
// over a sliding window of recent request latencies.

use super::DetectionEngine;
use crate::core::model::{Concurrency, EngineMatch};
use crate::core::patterns::CompiledPatterns;
use crate::util::constants;
use crate::util::error::EngineError;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for one chat endpoint.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub threshold: f64,
}

// =============================================================================
// Engine
// =============================================================================

/// Chat-endpoint detection engine ("ollama" for the local default,
/// "openai" for an OpenAI-compatible hosted endpoint).
pub struct LlmEngine {
    name: &'static str,
    client: reqwest::blocking::Client,
    settings: LlmSettings,
    patterns: Arc<CompiledPatterns>,
    latencies: Mutex<VecDeque<Duration>>,
    permits: Semaphore,
}

impl LlmEngine {
    pub fn new(
        name: &'static str,
        settings: LlmSettings,
        patterns: Arc<CompiledPatterns>,
    ) -> Result<Self, EngineError> {
        let client = build_client(name, settings.timeout)?;
        Ok(Self {
            name,
            client,
            settings,
            patterns,
            latencies: Mutex::new(VecDeque::new()),
            permits: Semaphore::new(constants::LLM_MAX_CONCURRENT_REQUESTS),
        })
    }

    fn request(&self, chunk: &str) -> Result<String, EngineError> {
        let _permit = self.permits.acquire();
        self.throttle();

        let body = serde_json::json!({
            "model": self.settings.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": extraction_prompt(self.patterns.ner_terms())},
                {"role": "user", "content": truncate_chunk(chunk)}
            ]
        });

        let started = Instant::now();
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().map_err(|e| EngineError::Http {
            engine: self.name,
            reason: e.to_string(),
        })?;
        self.record_latency(started.elapsed());

        if !response.status().is_success() {
            return Err(EngineError::Http {
                engine: self.name,
                reason: format!("endpoint returned {}", response.status()),
            });
        }
        let reply: ChatResponse = response.json().map_err(|e| EngineError::ResponseParse {
            engine: self.name,
            reason: e.to_string(),
        })?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(EngineError::ResponseParse {
                engine: self.name,
                reason: "no choices in reply".to_string(),
            })
    }

    /// Sleep before the next call when the mean recent latency exceeds the
    /// threshold; the delay is bounded.
    fn throttle(&self) {
        let mean_ms = {
            let window = self.latencies.lock().expect("latency window poisoned");
            if window.is_empty() {
                return;
            }
            let total: Duration = window.iter().sum();
            (total / window.len() as u32).as_millis() as u64
        };
        if mean_ms > constants::LLM_LATENCY_THRESHOLD_MS {
            let delay =
                (mean_ms - constants::LLM_LATENCY_THRESHOLD_MS).min(constants::LLM_MAX_DELAY_MS);
            tracing::debug!(engine = self.name, mean_ms, delay_ms = delay, "Adaptive throttle");
            std::thread::sleep(Duration::from_millis(delay));
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        let mut window = self.latencies.lock().expect("latency window poisoned");
        window.push_back(elapsed);
        while window.len() > constants::LLM_LATENCY_WINDOW {
            window.pop_front();
        }
    }
}

impl DetectionEngine for LlmEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::ExternalSerialized
    }

    fn is_available(&self) -> Result<(), EngineError> {
        if self.name == "openai" && self.settings.api_key.is_none() {
            return Err(EngineError::Unavailable {
                engine: self.name,
                reason: "no API key configured".to_string(),
            });
        }
        let mut request = self.client.get(format!("{}/models", self.settings.base_url));
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        match request.send() {
            Ok(response) if response.status().is_server_error() => Err(EngineError::Unavailable {
                engine: self.name,
                reason: format!("endpoint returned {}", response.status()),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(EngineError::Unavailable {
                engine: self.name,
                reason: format!("endpoint unreachable: {e}"),
            }),
        }
    }

    fn detect(&self, text: &str) -> Result<Vec<EngineMatch>, EngineError> {
        let content = self.request(text)?;
        // A model that answers with prose instead of JSON yields nothing;
        // that is a per-chunk condition, not an engine failure.
        let entities = match parse_entities(&content) {
            Some(entities) => entities,
            None => {
                tracing::debug!(engine = self.name, "Unparseable model reply, no findings");
                return Ok(Vec::new());
            }
        };
        Ok(to_matches(
            entities,
            self.name,
            self.settings.threshold,
            &self.settings.model,
            &self.patterns,
        ))
    }
}

// =============================================================================
// Shared endpoint plumbing (also used by the multimodal engine)
// =============================================================================

pub(crate) fn build_client(
    engine: &'static str,
    timeout: Duration,
) -> Result<reqwest::blocking::Client, EngineError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EngineError::Unavailable {
            engine,
            reason: format!("HTTP client build failed: {e}"),
        })
}

/// The fixed extraction prompt.
pub(crate) fn extraction_prompt(labels: &[String]) -> String {
    format!(
        "Extract all PII entities from the user's text. Return a JSON object \
         with key \"entities\" whose value is an array of \
         {{\"text\", \"type\", \"confidence\"}} objects. Use only these types: \
         {}. Return {{\"entities\": []}} when nothing is found.",
        labels.join(", ")
    )
}

/// Bound the chunk forwarded to the endpoint, on a char boundary.
pub(crate) fn truncate_chunk(chunk: &str) -> &str {
    if chunk.len() <= constants::LLM_MAX_CHUNK_CHARS {
        return chunk;
    }
    let mut end = constants::LLM_MAX_CHUNK_CHARS;
    while !chunk.is_char_boundary(end) {
        end -= 1;
    }
    &chunk[..end]
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatMessage {
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct EntityReply {
    #[serde(default)]
    entities: Vec<ReplyEntity>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: Option<f64>,
}

/// Parse the model reply as the expected JSON object, stripping Markdown
/// code fences when present. `None` when the reply does not parse.
pub(crate) fn parse_entities(content: &str) -> Option<Vec<ReplyEntity>> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_start())
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed);
    serde_json::from_str::<EntityReply>(body.trim())
        .ok()
        .map(|reply| reply.entities)
}

/// Convert reply entities to engine matches: threshold-filtered, labels
/// mapped into the configured vocabulary (engine-prefixed otherwise).
pub(crate) fn to_matches(
    entities: Vec<ReplyEntity>,
    engine: &'static str,
    threshold: f64,
    model: &str,
    patterns: &CompiledPatterns,
) -> Vec<EngineMatch> {
    entities
        .into_iter()
        .filter(|e| !e.text.trim().is_empty())
        .filter(|e| e.confidence.unwrap_or(1.0) >= threshold)
        .map(|e| {
            let kind = e.kind.to_lowercase();
            let label = if patterns.is_known_label(&kind) {
                kind
            } else if let Some(mapped) = patterns.label_for_term(&kind) {
                mapped.to_string()
            } else {
                format!("{engine}:{}", e.kind)
            };
            let mut metadata = BTreeMap::new();
            metadata.insert("model".to_string(), model.to_string());
            EngineMatch {
                text: e.text,
                label,
                confidence: Some(e.confidence.unwrap_or(1.0)),
                metadata,
            }
        })
        .collect()
}

// =============================================================================
// Counting semaphore (at-most-N outbound requests)
// =============================================================================

pub(crate) struct Semaphore {
    state: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    pub(crate) fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.state.lock().expect("semaphore poisoned");
        while *permits == 0 {
            permits = self.available.wait(permits).expect("semaphore poisoned");
        }
        *permits -= 1;
        SemaphorePermit { semaphore: self }
    }
}

pub(crate) struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        let mut permits = self.semaphore.state.lock().expect("semaphore poisoned");
        *permits += 1;
        self.semaphore.available.notify_one();
    }
}

// =============================================================================
// Tests
// =============================================================================
