// piiscan - engines/multimodal.rs
//
// Multimodal LLM engine: invoked only for image files. The image is
// base64-encoded into a data URL and sent alongside the extraction
// prompt; reply parsing matches the text LLM engine.

use super::llm::{
    build_client, extraction_prompt, parse_entities, to_matches, ChatResponse, LlmSettings,
    Semaphore,
};
use super::DetectionEngine;
use crate::core::model::{Concurrency, EngineMatch};
use crate::core::patterns::CompiledPatterns;
use crate::util::constants;
use crate::util::error::EngineError;
use base64::Engine as _;
use std::path::Path;
use std::sync::Arc;

/// Image-input chat engine.
pub struct MultimodalEngine {
    client: reqwest::blocking::Client,
    settings: LlmSettings,
    patterns: Arc<CompiledPatterns>,
    permits: Semaphore,
}

impl MultimodalEngine {
    pub fn new(
        settings: LlmSettings,
        patterns: Arc<CompiledPatterns>,
    ) -> Result<Self, EngineError> {
        let client = build_client("multimodal", settings.timeout)?;
        Ok(Self {
            client,
            settings,
            patterns,
            permits: Semaphore::new(constants::LLM_MAX_CONCURRENT_REQUESTS),
        })
    }
}

impl DetectionEngine for MultimodalEngine {
    fn name(&self) -> &'static str {
        "multimodal"
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::ExternalSerialized
    }

    fn is_available(&self) -> Result<(), EngineError> {
        let mut request = self.client.get(format!("{}/models", self.settings.base_url));
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        match request.send() {
            Ok(response) if response.status().is_server_error() => Err(EngineError::Unavailable {
                engine: "multimodal",
                reason: format!("endpoint returned {}", response.status()),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(EngineError::Unavailable {
                engine: "multimodal",
                reason: format!("endpoint unreachable: {e}"),
            }),
        }
    }

    fn detect(&self, _text: &str) -> Result<Vec<EngineMatch>, EngineError> {
        // Text chunks are not this engine's input.
        Ok(Vec::new())
    }

    fn handles_images(&self) -> bool {
        true
    }

    fn detect_image(&self, path: &Path) -> Result<Vec<EngineMatch>, EngineError> {
        let bytes = std::fs::read(path).map_err(|e| EngineError::Detection {
            engine: "multimodal",
            reason: format!("cannot read image '{}': {e}", path.display()),
        })?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let data_url = format!("data:{};base64,{encoded}", image_mime(path));

        let body = serde_json::json!({
            "model": self.settings.model,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": extraction_prompt(self.patterns.ner_terms())},
                    {"type": "image_url", "image_url": {"url": data_url}}
                ]
            }]
        });

        let _permit = self.permits.acquire();
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().map_err(|e| EngineError::Http {
            engine: "multimodal",
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(EngineError::Http {
                engine: "multimodal",
                reason: format!("endpoint returned {}", response.status()),
            });
        }
        let reply: ChatResponse = response.json().map_err(|e| EngineError::ResponseParse {
            engine: "multimodal",
            reason: e.to_string(),
        })?;
        let Some(content) = reply.choices.into_iter().next().map(|c| c.message.content) else {
            return Ok(Vec::new());
        };

        let entities = match parse_entities(&content) {
            Some(entities) => entities,
            None => {
                tracing::debug!(engine = "multimodal", "Unparseable model reply, no findings");
                return Ok(Vec::new());
            }
        };
        Ok(to_matches(
            entities,
            "multimodal",
            self.settings.threshold,
            &self.settings.model,
            &self.patterns,
        ))
    }
}

/// MIME type for the data URL, from the file extension.
fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tiff") | Some("tif") => "image/tiff",
        _ => "image/jpeg",
    }
}
