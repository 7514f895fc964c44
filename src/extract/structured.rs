// piiscan - extract/structured.rs
//
// Extractors for row/tree-structured text formats: CSV/TSV (all fields),
// JSON (all string values, recursively), XML (element text and attribute
// values), YAML (all scalar values). All four decode eagerly; these
// formats are line- or token-oriented and do not need chunking.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::error::ExtractError;
use quick_xml::events::Event;
use serde::Deserialize;
use std::path::Path;

// =============================================================================
// CSV / TSV
// =============================================================================

/// All fields of a delimited file, one record per line.
pub struct CsvExtractor;

impl TextExtractor for CsvExtractor {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".csv", ".tsv"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["text/csv"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let delimiter = if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tsv"))
        {
            b'\t'
        } else {
            b','
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| ExtractError::Decode {
                path: path.to_path_buf(),
                format: "csv",
                reason: e.to_string(),
            })?;

        let mut out = String::new();
        for record in reader.records() {
            let record = record.map_err(|e| ExtractError::Decode {
                path: path.to_path_buf(),
                format: "csv",
                reason: e.to_string(),
            })?;
            let mut first = true;
            for field in record.iter() {
                if !first {
                    out.push(' ');
                }
                out.push_str(field);
                first = false;
            }
            out.push('\n');
        }
        Ok(TextContent::Text(out))
    }
}

// =============================================================================
// JSON
// =============================================================================

/// Every string value in a JSON document, depth-first.
pub struct JsonExtractor;

impl TextExtractor for JsonExtractor {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".json", ".jsonl", ".ndjson"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/json"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let bytes = super::read_bytes(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let line_oriented = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jsonl") || e.eq_ignore_ascii_case("ndjson"));

        let mut out = String::new();
        if line_oriented {
            // One document per line; a malformed line fails the file.
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                let value: serde_json::Value =
                    serde_json::from_str(line).map_err(|e| ExtractError::Decode {
                        path: path.to_path_buf(),
                        format: "json",
                        reason: e.to_string(),
                    })?;
                collect_json_strings(&value, &mut out);
            }
        } else {
            let value: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| ExtractError::Decode {
                    path: path.to_path_buf(),
                    format: "json",
                    reason: e.to_string(),
                })?;
            collect_json_strings(&value, &mut out);
        }
        Ok(TextContent::Text(out))
    }
}

fn collect_json_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_json_strings(item, out);
            }
        }
        _ => {}
    }
}

// =============================================================================
// XML
// =============================================================================

/// Element text and attribute values of an XML document.
pub struct XmlExtractor;

impl TextExtractor for XmlExtractor {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xml"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/xml", "text/xml"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let bytes = super::read_bytes(path)?;
        xml_text(&bytes)
            .map(TextContent::Text)
            .map_err(|reason| ExtractError::Decode {
                path: path.to_path_buf(),
                format: "xml",
                reason,
            })
    }
}

/// Collect element text and attribute values from an XML byte buffer.
pub(crate) fn xml_text(bytes: &[u8]) -> Result<String, String> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut out = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                for attr in e.attributes().flatten() {
                    if let Ok(value) = attr.unescape_value() {
                        if !value.trim().is_empty() {
                            out.push_str(value.trim());
                            out.push('\n');
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Ok(text) = t.unescape() {
                    if !text.trim().is_empty() {
                        out.push_str(text.trim());
                        out.push('\n');
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

// =============================================================================
// YAML
// =============================================================================

/// Every scalar value in a YAML document (multi-document files included).
pub struct YamlExtractor;

impl TextExtractor for YamlExtractor {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".yaml", ".yml"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let bytes = super::read_bytes(path)?;
        let text = String::from_utf8_lossy(&bytes);

        let mut out = String::new();
        for document in serde_yaml::Deserializer::from_str(&text) {
            let value = serde_yaml::Value::deserialize(document).map_err(|e| {
                ExtractError::Decode {
                    path: path.to_path_buf(),
                    format: "yaml",
                    reason: e.to_string(),
                }
            })?;
            collect_yaml_scalars(&value, &mut out);
        }
        Ok(TextContent::Text(out))
    }
}

fn collect_yaml_scalars(value: &serde_yaml::Value, out: &mut String) {
    match value {
        serde_yaml::Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        serde_yaml::Value::Number(n) => {
            out.push_str(&n.to_string());
            out.push('\n');
        }
        serde_yaml::Value::Bool(b) => {
            out.push_str(if *b { "true" } else { "false" });
            out.push('\n');
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                collect_yaml_scalars(item, out);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map {
                collect_yaml_scalars(item, out);
            }
        }
        serde_yaml::Value::Tagged(tagged) => collect_yaml_scalars(&tagged.value, out),
        serde_yaml::Value::Null => {}
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn eager(content: TextContent) -> String {
        match content {
            TextContent::Text(s) => s,
            other => panic!("expected eager text, got {other:?}"),
        }
    }

    #[test]
    fn test_csv_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.csv");
        fs::write(&path, "name,mail\nAnna,u@example.com\n").unwrap();

        let out = eager(CsvExtractor.extract(&path).unwrap());
        assert!(out.contains("u@example.com"));
        assert!(out.contains("Anna"));
    }

    #[test]
    fn test_tsv_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.tsv");
        fs::write(&path, "Anna\tu@example.com\n").unwrap();

        let out = eager(CsvExtractor.extract(&path).unwrap());
        assert!(out.contains("u@example.com"));
    }

    #[test]
    fn test_json_nested_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(
            &path,
            r#"{"user": {"mail": "u@example.com", "tags": ["x", "y"], "age": 7}}"#,
        )
        .unwrap();

        let out = eager(JsonExtractor.extract(&path).unwrap());
        assert!(out.contains("u@example.com"));
        assert!(out.contains('x'));
        assert!(!out.contains('7'), "non-string scalars are not text values");
    }

    #[test]
    fn test_json_malformed_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonExtractor.extract(&path),
            Err(ExtractError::Decode { format: "json", .. })
        ));
    }

    #[test]
    fn test_xml_text_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.xml");
        fs::write(
            &path,
            r#"<root note="u@example.com"><item>DE89370400440532013000</item></root>"#,
        )
        .unwrap();

        let out = eager(XmlExtractor.extract(&path).unwrap());
        assert!(out.contains("u@example.com"), "attribute values included");
        assert!(out.contains("DE89370400440532013000"), "element text included");
    }

    #[test]
    fn test_yaml_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        fs::write(&path, "contact: u@example.com\nretries: 3\nnested:\n  - Anna\n").unwrap();

        let out = eager(YamlExtractor.extract(&path).unwrap());
        assert!(out.contains("u@example.com"));
        assert!(out.contains("Anna"));
        assert!(out.contains('3'), "numeric scalars are stringified");
    }
}
