// piiscan - extract/office.rs
//
// Office document extraction. OOXML (docx/pptx/xlsx) and OpenDocument
// (odt/ods) files are ZIP containers holding XML parts; the members are
// parsed with quick-xml and only the text-bearing elements are kept.
//
// Chunking: word-processing and OpenDocument files decode eagerly (one
// body part); presentations chunk per slide and spreadsheets per sheet.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::error::ExtractError;
use quick_xml::events::Event;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

// =============================================================================
// Shared container helpers
// =============================================================================

fn open_container(path: &Path) -> Result<ZipArchive<File>, ExtractError> {
    let file = File::open(path).map_err(|e| ExtractError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    ZipArchive::new(file).map_err(|e| ExtractError::Zip {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_member(
    archive: &mut ZipArchive<File>,
    path: &Path,
    member: &str,
) -> Result<Vec<u8>, ExtractError> {
    let mut entry = archive.by_name(member).map_err(|e| ExtractError::Zip {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).map_err(|e| ExtractError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(buf)
}

/// Collect the text content of every `text_tag` element in an XML part,
/// inserting a newline at the end of each `break_tag` element.
fn tagged_text(bytes: &[u8], text_tag: &[u8], break_tag: &[u8]) -> Result<String, String> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut out = String::new();
    let mut buf = Vec::new();
    let mut in_text = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == text_tag => in_text += 1,
            Ok(Event::End(e)) if e.name().as_ref() == text_tag => {
                in_text = in_text.saturating_sub(1);
            }
            Ok(Event::End(e)) if e.name().as_ref() == break_tag => out.push('\n'),
            Ok(Event::Text(t)) if in_text > 0 => {
                if let Ok(text) = t.unescape() {
                    out.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }
    Ok(out)
}

/// Members matching `prefix`/`stem`N`.xml`, sorted by N.
fn numbered_members(archive: &ZipArchive<File>, prefix: &str, stem: &str) -> Vec<String> {
    let mut members: Vec<(u32, String)> = archive
        .file_names()
        .filter(|name| {
            name.starts_with(prefix)
                && name.ends_with(".xml")
                && name[prefix.len()..].starts_with(stem)
        })
        .filter_map(|name| {
            let digits: String = name[prefix.len() + stem.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse::<u32>().ok().map(|n| (n, name.to_string()))
        })
        .collect();
    members.sort();
    members.into_iter().map(|(_, name)| name).collect()
}

// =============================================================================
// Word processing (.docx)
// =============================================================================

/// Word-processing OOXML: text runs of the main document part.
pub struct WordExtractor;

impl TextExtractor for WordExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".docx"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let mut archive = open_container(path)?;
        let body = read_member(&mut archive, path, "word/document.xml")?;
        tagged_text(&body, b"w:t", b"w:p")
            .map(TextContent::Text)
            .map_err(|reason| ExtractError::Decode {
                path: path.to_path_buf(),
                format: "docx",
                reason,
            })
    }
}

// =============================================================================
// Presentations (.pptx)
// =============================================================================

/// Presentation OOXML: one chunk per slide (slide text plus notes).
pub struct PresentationExtractor;

impl TextExtractor for PresentationExtractor {
    fn name(&self) -> &'static str {
        "pptx"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".pptx"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/vnd.openxmlformats-officedocument.presentationml.presentation"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let archive = open_container(path)?;
        let mut members = numbered_members(&archive, "ppt/slides/", "slide");
        members.extend(numbered_members(
            &archive,
            "ppt/notesSlides/",
            "notesSlide",
        ));
        Ok(TextContent::Chunks(Box::new(OoxmlChunks {
            archive,
            path: path.to_path_buf(),
            members,
            next: 0,
            format: "pptx",
            text_tag: b"a:t",
            break_tag: b"a:p",
        })))
    }
}

/// Lazy per-member chunk sequence over an OOXML container.
struct OoxmlChunks {
    archive: ZipArchive<File>,
    path: PathBuf,
    members: Vec<String>,
    next: usize,
    format: &'static str,
    text_tag: &'static [u8],
    break_tag: &'static [u8],
}

impl Iterator for OoxmlChunks {
    type Item = Result<String, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        let member = self.members.get(self.next)?.clone();
        self.next += 1;
        let result = read_member(&mut self.archive, &self.path, &member).and_then(|bytes| {
            tagged_text(&bytes, self.text_tag, self.break_tag).map_err(|reason| {
                ExtractError::Decode {
                    path: self.path.clone(),
                    format: self.format,
                    reason: format!("{member}: {reason}"),
                }
            })
        });
        Some(result)
    }
}

// =============================================================================
// Spreadsheets (.xlsx)
// =============================================================================

/// Spreadsheet OOXML: one chunk per worksheet, cell values only (formula
/// elements are skipped; their cached results are values and are kept).
pub struct SpreadsheetExtractor;

impl TextExtractor for SpreadsheetExtractor {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xlsx"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let mut archive = open_container(path)?;

        // Shared strings are optional; a workbook of inline/numeric cells
        // has none.
        let shared = match read_member(&mut archive, path, "xl/sharedStrings.xml") {
            Ok(bytes) => parse_shared_strings(&bytes).map_err(|reason| ExtractError::Decode {
                path: path.to_path_buf(),
                format: "xlsx",
                reason,
            })?,
            Err(_) => Vec::new(),
        };

        let members = numbered_members(&archive, "xl/worksheets/", "sheet");
        if members.is_empty() {
            return Err(ExtractError::Decode {
                path: path.to_path_buf(),
                format: "xlsx",
                reason: "no worksheets found".to_string(),
            });
        }
        Ok(TextContent::Chunks(Box::new(SheetChunks {
            archive,
            path: path.to_path_buf(),
            members,
            next: 0,
            shared,
        })))
    }
}

/// `<si>` entries of the shared-string table, in order.
fn parse_shared_strings(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"t" if in_item => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                if let Ok(text) = t.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }
    Ok(strings)
}

/// Lazy per-sheet chunk sequence.
struct SheetChunks {
    archive: ZipArchive<File>,
    path: PathBuf,
    members: Vec<String>,
    next: usize,
    shared: Vec<String>,
}

impl Iterator for SheetChunks {
    type Item = Result<String, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        let member = self.members.get(self.next)?.clone();
        self.next += 1;
        let result = read_member(&mut self.archive, &self.path, &member).and_then(|bytes| {
            sheet_values(&bytes, &self.shared).map_err(|reason| ExtractError::Decode {
                path: self.path.clone(),
                format: "xlsx",
                reason: format!("{member}: {reason}"),
            })
        });
        Some(result)
    }
}

/// Cell values of one worksheet part: shared strings resolved, inline
/// strings and literal values kept, formula text (`<f>`) skipped.
fn sheet_values(bytes: &[u8], shared: &[String]) -> Result<String, String> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut out = String::new();
    let mut buf = Vec::new();
    let mut cell_type = CellType::Literal;
    let mut in_value = false;
    let mut in_inline_text = false;
    let mut in_formula = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"c" => {
                    cell_type = CellType::Literal;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"t" {
                            cell_type = match attr.value.as_ref() {
                                b"s" => CellType::Shared,
                                b"inlineStr" => CellType::Inline,
                                _ => CellType::Literal,
                            };
                        }
                    }
                }
                b"v" => in_value = true,
                b"f" => in_formula = true,
                b"t" if cell_type == CellType::Inline => in_inline_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"v" => in_value = false,
                b"f" => in_formula = false,
                b"t" => in_inline_text = false,
                b"row" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if !in_formula && (in_value || in_inline_text) => {
                if let Ok(text) = t.unescape() {
                    if cell_type == CellType::Shared && in_value {
                        if let Some(s) = text
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|idx| shared.get(idx))
                        {
                            out.push_str(s);
                            out.push(' ');
                        }
                    } else {
                        out.push_str(&text);
                        out.push(' ');
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
    Literal,
    Shared,
    Inline,
}

// =============================================================================
// OpenDocument (.odt, .ods)
// =============================================================================

/// OpenDocument text and spreadsheet: all text of `content.xml`.
pub struct OpenDocumentExtractor;

impl TextExtractor for OpenDocumentExtractor {
    fn name(&self) -> &'static str {
        "opendocument"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".odt", ".ods"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &[
            "application/vnd.oasis.opendocument.text",
            "application/vnd.oasis.opendocument.spreadsheet",
        ]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let mut archive = open_container(path)?;
        let body = read_member(&mut archive, path, "content.xml")?;
        odf_text(&body)
            .map(TextContent::Text)
            .map_err(|reason| ExtractError::Decode {
                path: path.to_path_buf(),
                format: "opendocument",
                reason,
            })
    }
}

/// All text events of an ODF content part, newline per paragraph.
fn odf_text(bytes: &[u8]) -> Result<String, String> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut out = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                if let Ok(text) = t.unescape() {
                    if !text.trim().is_empty() {
                        out.push_str(text.trim());
                        out.push(' ');
                    }
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"text:p" => out.push('\n'),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
