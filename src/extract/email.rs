// piiscan - extract/email.rs
//
// Email extraction. Single messages (.eml) decode eagerly: the raw header
// block (From/To/Subject carry most of the PII) plus every decoded text
// body. Mailboxes (.mbox) chunk per message.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::error::ExtractError;
use mail_parser::MessageParser;
use std::path::Path;

// =============================================================================
// Single message (.eml)
// =============================================================================

/// RFC 5322 message extractor.
pub struct EmailExtractor;

impl TextExtractor for EmailExtractor {
    fn name(&self) -> &'static str {
        "email"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".eml"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["message/rfc822"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let bytes = super::read_bytes(path)?;
        message_text(&bytes).map(TextContent::Text).ok_or_else(|| {
            ExtractError::Decode {
                path: path.to_path_buf(),
                format: "email",
                reason: "not a parseable RFC 5322 message".to_string(),
            }
        })
    }
}

/// Header block plus decoded text bodies of one raw message.
fn message_text(raw: &[u8]) -> Option<String> {
    let message = MessageParser::default().parse(raw)?;

    let mut out = String::new();
    // Raw header block: everything before the first blank line. Encoded
    // words stay encoded; addresses and plain subjects are readable and
    // the decoded subject is appended separately below.
    let header_end = find_header_end(raw);
    out.push_str(String::from_utf8_lossy(&raw[..header_end]).as_ref());
    out.push('\n');

    if let Some(subject) = message.subject() {
        out.push_str(subject);
        out.push('\n');
    }
    let mut part = 0;
    while let Some(body) = message.body_text(part) {
        out.push_str(&body);
        out.push('\n');
        part += 1;
    }
    Some(out)
}

fn find_header_end(raw: &[u8]) -> usize {
    raw.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 2)
        .or_else(|| raw.windows(2).position(|w| w == b"\n\n").map(|p| p + 1))
        .unwrap_or(raw.len())
}

// =============================================================================
// Mailbox (.mbox)
// =============================================================================

/// Mbox extractor: one chunk per contained message.
pub struct MboxExtractor;

impl TextExtractor for MboxExtractor {
    fn name(&self) -> &'static str {
        "mbox"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".mbox"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let bytes = super::read_bytes(path)?;
        let messages = split_mbox(&bytes);
        if messages.is_empty() {
            return Err(ExtractError::Decode {
                path: path.to_path_buf(),
                format: "mbox",
                reason: "no 'From ' separator found".to_string(),
            });
        }

        let path_owned = path.to_path_buf();
        tracing::debug!(path = %path_owned.display(), messages = messages.len(), "Mbox split");
        Ok(TextContent::Chunks(Box::new(messages.into_iter().map(
            move |raw| {
                message_text(&raw).ok_or_else(|| ExtractError::Decode {
                    path: path_owned.clone(),
                    format: "mbox",
                    reason: "unparseable member message".to_string(),
                })
            },
        ))))
    }
}

/// Split an mbox buffer on "From " separator lines.
fn split_mbox(bytes: &[u8]) -> Vec<Vec<u8>> {
    if !bytes.starts_with(b"From ") {
        return Vec::new();
    }
    let mut messages = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut first = true;
    for line in bytes.split_inclusive(|b| *b == b'\n') {
        if line.starts_with(b"From ") {
            if !first {
                messages.push(std::mem::take(&mut current));
            }
            first = false;
            // The separator line itself is mbox framing, not message text.
            continue;
        }
        if !first {
            current.extend_from_slice(line);
        }
    }
    if !current.is_empty() || !first {
        messages.push(current);
    }
    messages
}

// =============================================================================
// Tests
// =============================================================================
