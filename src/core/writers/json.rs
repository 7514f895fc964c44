// piiscan - core/writers/json.rs
//
// Buffered JSON document writer. The document has three top-level
// sections: metadata, statistics, findings.

use super::{FindingsWriter, WriteMode};
use crate::core::model::Finding;
use crate::core::stats::Summary;
use crate::util::constants;
use crate::util::error::WriterError;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Document metadata section.
#[derive(Debug, Serialize)]
struct Metadata {
    application: &'static str,
    version: &'static str,
    generated_at: chrono::DateTime<chrono::Utc>,
}

/// The single JSON document produced on close.
#[derive(Debug, Serialize)]
struct Document<'a> {
    metadata: Metadata,
    statistics: &'a Option<Summary>,
    findings: &'a [Finding],
}

/// Buffering JSON findings writer.
pub struct JsonWriter {
    path: PathBuf,
    findings: Vec<Finding>,
    summary: Option<Summary>,
    closed: bool,
}

impl JsonWriter {
    /// Validate that the output file is creatable up front, so a bad
    /// output directory fails the run before any scanning happens.
    pub fn create(path: &Path) -> Result<Self, WriterError> {
        File::create(path).map_err(|e| WriterError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            findings: Vec::new(),
            summary: None,
            closed: false,
        })
    }
}

impl FindingsWriter for JsonWriter {
    fn mode(&self) -> WriteMode {
        WriteMode::Document
    }

    fn write_finding(&mut self, finding: &Finding) -> Result<(), WriterError> {
        if !self.closed {
            self.findings.push(finding.clone());
        }
        Ok(())
    }

    fn write_summary(&mut self, summary: &Summary) -> Result<(), WriterError> {
        self.summary = Some(summary.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriterError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let document = Document {
            metadata: Metadata {
                application: constants::APP_NAME,
                version: constants::APP_VERSION,
                generated_at: chrono::Utc::now(),
            },
            statistics: &self.summary,
            findings: &self.findings,
        };

        let mut file = File::create(&self.path).map_err(|e| WriterError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        serde_json::to_writer_pretty(&mut file, &document).map_err(|e| WriterError::Json {
            path: self.path.clone(),
            source: e,
        })?;
        file.flush().map_err(|e| WriterError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::{MatchCounts, Statistics};
    use std::collections::BTreeMap;
    use std::fs;

    #[test]
    fn test_document_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut writer = JsonWriter::create(&path).unwrap();
        writer
            .write_finding(&Finding {
                text: "DE89370400440532013000".to_string(),
                file: PathBuf::from("/scan/a.txt"),
                label: "iban".to_string(),
                confidence: None,
                engine: "regex".to_string(),
                metadata: BTreeMap::new(),
            })
            .unwrap();

        let stats = Statistics::new();
        stats.record_analyzed(".txt");
        stats.freeze();
        writer
            .write_summary(&stats.snapshot(MatchCounts {
                added: 1,
                whitelisted: 0,
                deduplicated: 0,
                written: 1,
            }))
            .unwrap();
        writer.close().unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["metadata"]["application"], "piiscan");
        assert_eq!(v["statistics"]["files_analyzed"], 1);
        assert_eq!(v["findings"][0]["match"], "DE89370400440532013000");
        assert_eq!(v["findings"][0]["type"], "iban");
    }

    #[test]
    fn test_close_without_findings_still_valid_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        let mut writer = JsonWriter::create(&path).unwrap();
        writer.close().unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(v["findings"].as_array().unwrap().is_empty());
        assert!(v["statistics"].is_null());
    }
}
