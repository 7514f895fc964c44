// piiscan - extract/rtf.rs
//
// Rich Text Format extraction: a minimal control-word stripper that keeps
// document text and resolves the escapes that occur in practice (\par,
// \tab, \'hh hex escapes, \u Unicode escapes). Destination groups whose
// content is not document text (fonttbl, stylesheet, pict, ...) are
// skipped wholesale.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::error::ExtractError;
use std::path::Path;

/// Control-word-stripping RTF extractor.
pub struct RtfExtractor;

impl TextExtractor for RtfExtractor {
    fn name(&self) -> &'static str {
        "rtf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".rtf"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/rtf", "text/rtf"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let bytes = super::read_bytes(path)?;
        let raw = String::from_utf8_lossy(&bytes);
        if !raw.trim_start().starts_with("{\\rtf") {
            return Err(ExtractError::Decode {
                path: path.to_path_buf(),
                format: "rtf",
                reason: "missing {\\rtf header".to_string(),
            });
        }
        Ok(TextContent::Text(strip_rtf(&raw)))
    }
}

/// Destinations whose group content never contains document text.
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "object",
    "header",
    "footer",
    "generator",
    "themedata",
];

/// Strip RTF control words from `input`, returning the document text.
fn strip_rtf(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    // Depth below which we are inside a skipped destination group; None
    // when no skip is active.
    let mut skip_above: Option<usize> = None;
    let mut depth = 0usize;

    while i < chars.len() {
        match chars[i] {
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                if skip_above == Some(depth) {
                    skip_above = None;
                }
                depth = depth.saturating_sub(1);
                i += 1;
            }
            '\\' => {
                i += 1;
                if i >= chars.len() {
                    break;
                }
                match chars[i] {
                    // Escaped literals.
                    '{' | '}' | '\\' => {
                        if skip_above.is_none() {
                            out.push(chars[i]);
                        }
                        i += 1;
                    }
                    // Hex escape \'hh (Windows-1252 byte; ASCII range kept,
                    // the rest degraded to the replacement character).
                    '\'' => {
                        let hex: String = chars[i + 1..].iter().take(2).collect();
                        if skip_above.is_none() {
                            match u8::from_str_radix(&hex, 16) {
                                Ok(b) if b.is_ascii() => out.push(b as char),
                                Ok(_) => out.push('\u{FFFD}'),
                                Err(_) => {}
                            }
                        }
                        i += 1 + hex.len();
                    }
                    c if c.is_ascii_alphabetic() => {
                        let start = i;
                        while i < chars.len() && chars[i].is_ascii_alphabetic() {
                            i += 1;
                        }
                        let word: String = chars[start..i].iter().collect();
                        // Optional numeric parameter.
                        let param_start = i;
                        if i < chars.len() && (chars[i] == '-' || chars[i].is_ascii_digit()) {
                            i += 1;
                            while i < chars.len() && chars[i].is_ascii_digit() {
                                i += 1;
                            }
                        }
                        let param: String = chars[param_start..i].iter().collect();
                        // One space after a control word belongs to it.
                        if i < chars.len() && chars[i] == ' ' {
                            i += 1;
                        }

                        if SKIPPED_DESTINATIONS.contains(&word.as_str()) && skip_above.is_none() {
                            skip_above = Some(depth);
                        } else if skip_above.is_none() {
                            match word.as_str() {
                                "par" | "line" | "row" => out.push('\n'),
                                "tab" | "cell" => out.push(' '),
                                "u" => {
                                    // \uN: signed 16-bit code unit, followed
                                    // by one fallback character to discard.
                                    if let Ok(n) = param.parse::<i32>() {
                                        let code = if n < 0 { n + 65_536 } else { n } as u32;
                                        if let Some(c) = char::from_u32(code) {
                                            out.push(c);
                                        }
                                    }
                                    if i < chars.len() && chars[i] != '\\' && chars[i] != '{' {
                                        i += 1;
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    // \* marks an optional destination; the group is kept
                    // only if its control word is known, so skip it.
                    '*' => {
                        if skip_above.is_none() {
                            skip_above = Some(depth);
                        }
                        i += 1;
                    }
                    _ => i += 1,
                }
            }
            '\r' | '\n' => i += 1,
            c => {
                if skip_above.is_none() {
                    out.push(c);
                }
                i += 1;
            }
        }
    }
    out
}
