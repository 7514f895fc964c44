// piiscan - core/writers/csv.rs
//
// Row-streaming CSV writer. The crash-tolerant path: each row is flushed
// as it is written.

use super::{finding_cells, FindingsWriter, WriteMode};
use crate::core::model::Finding;
use crate::core::stats::Summary;
use crate::util::constants;
use crate::util::error::WriterError;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Streaming CSV findings writer.
pub struct CsvWriter {
    path: PathBuf,
    /// `None` after close; the handle is released exactly once.
    inner: Option<csv::Writer<File>>,
}

impl CsvWriter {
    /// Open the output file and, unless disabled, write the header row.
    pub fn create(path: &Path, header: bool) -> Result<Self, WriterError> {
        let file = File::create(path).map_err(|e| WriterError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut inner = csv::Writer::from_writer(file);

        if header {
            inner
                .write_record(constants::FINDINGS_COLUMNS)
                .and_then(|()| inner.flush().map_err(csv::Error::from))
                .map_err(|e| WriterError::Csv {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            inner: Some(inner),
        })
    }
}

impl FindingsWriter for CsvWriter {
    fn mode(&self) -> WriteMode {
        WriteMode::RowStreaming
    }

    fn write_finding(&mut self, finding: &Finding) -> Result<(), WriterError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        inner
            .write_record(finding_cells(finding))
            .and_then(|()| inner.flush().map_err(csv::Error::from))
            .map_err(|e| WriterError::Csv {
                path: self.path.clone(),
                source: e,
            })
    }

    fn write_summary(&mut self, _summary: &Summary) -> Result<(), WriterError> {
        // The summary is rendered to the console for row formats.
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriterError> {
        if let Some(mut inner) = self.inner.take() {
            inner.flush().map_err(|e| WriterError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        // Last-resort flush so an unwound run still yields its rows.
        if let Some(mut inner) = self.inner.take() {
            let _ = inner.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    fn finding(confidence: Option<f64>) -> Finding {
        Finding {
            text: "u@example.com".to_string(),
            file: PathBuf::from("/scan/a.txt"),
            label: "email".to_string(),
            confidence,
            engine: "regex".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut writer = CsvWriter::create(&path, true).unwrap();
        writer.write_finding(&finding(None)).unwrap();
        writer.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("match,file,type,confidence,engine"));
        assert_eq!(
            lines.next(),
            Some("u@example.com,/scan/a.txt,email,,regex"),
            "empty confidence is an empty field"
        );
    }

    #[test]
    fn test_no_header_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut writer = CsvWriter::create(&path, false).unwrap();
        writer.write_finding(&finding(Some(0.875))).unwrap();
        writer.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("u@example.com,"));
        assert!(content.contains(",0.88,"), "confidence rendered to 2 dp");
    }

    #[test]
    fn test_rows_on_disk_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut writer = CsvWriter::create(&path, true).unwrap();
        writer.write_finding(&finding(None)).unwrap();

        // Not closed yet; per-row flush must have hit the disk already.
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("u@example.com"));
        writer.close().unwrap();
    }

    #[test]
    fn test_close_releases_handle_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut writer = CsvWriter::create(&path, true).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        // Writes after close are ignored, not errors.
        writer.write_finding(&finding(None)).unwrap();
    }
}
