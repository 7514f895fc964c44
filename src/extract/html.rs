// piiscan - extract/html.rs
//
// HTML extraction: visible text only. Script and style contents are not
// user-visible and are dropped.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::error::ExtractError;
use scraper::{Html, Node};
use std::path::Path;

/// Tag-stripped visible text of an HTML document.
pub struct HtmlExtractor;

impl TextExtractor for HtmlExtractor {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".html", ".htm", ".xhtml"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["text/html"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let bytes = super::read_bytes(path)?;
        let document = Html::parse_document(&String::from_utf8_lossy(&bytes));

        let mut out = String::new();
        for node in document.root_element().descendants() {
            if let Node::Text(text) = node.value() {
                // Skip text inside non-visible containers.
                let hidden = node.parent().is_some_and(|parent| {
                    parent.value().as_element().is_some_and(|el| {
                        matches!(el.name(), "script" | "style" | "noscript" | "template")
                    })
                });
                if hidden {
                    continue;
                }
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push_str(trimmed);
                    out.push('\n');
                }
            }
        }
        Ok(TextContent::Text(out))
    }
}
