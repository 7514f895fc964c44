// piiscan - core/writers/mod.rs
//
// Output writers. Two disciplines:
//   - row-streaming (CSV): every finding is flushed as it arrives, so a
//     crashed run still yields a partial report;
//   - document (JSON, XLSX): findings buffer in memory and the file is
//     written once on close, with metadata / statistics / findings
//     sections.
// All writers release the underlying file handle on every exit path and
// are finalised exactly once (the match container guarantees single
// close).

mod csv;
mod json;
mod xlsx;

pub use self::csv::CsvWriter;
pub use self::json::JsonWriter;
pub use self::xlsx::XlsxWriter;

use crate::core::model::{Finding, OutputFormat};
use crate::core::stats::Summary;
use crate::util::error::WriterError;
use std::path::Path;

/// Writer output discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Rows hit the disk as findings arrive.
    RowStreaming,

    /// Findings buffer; the document is produced on close.
    Document,
}

/// Format-specific findings sink.
pub trait FindingsWriter: Send {
    fn mode(&self) -> WriteMode;

    /// Record one finding (streamed or buffered per `mode`).
    fn write_finding(&mut self, finding: &Finding) -> Result<(), WriterError>;

    /// Record the run summary (document formats embed it; CSV ignores it,
    /// the summary goes to the console instead).
    fn write_summary(&mut self, summary: &Summary) -> Result<(), WriterError>;

    /// Flush and release the file handle.
    fn close(&mut self) -> Result<(), WriterError>;
}

/// Open the writer for `format` at `path`. `header` controls the CSV
/// header row (`--no-header` disables it; document formats always carry
/// their header).
pub fn open_writer(
    format: OutputFormat,
    path: &Path,
    header: bool,
) -> Result<Box<dyn FindingsWriter>, WriterError> {
    tracing::debug!(path = %path.display(), format = %format, "Opening findings writer");
    match format {
        OutputFormat::Csv => Ok(Box::new(CsvWriter::create(path, header)?)),
        OutputFormat::Json => Ok(Box::new(JsonWriter::create(path)?)),
        OutputFormat::Xlsx => Ok(Box::new(XlsxWriter::create(path)?)),
    }
}

/// Findings-table cell values for one finding, in column order
/// (`match, file, type, confidence, engine`). Empty fields are empty
/// strings.
pub(crate) fn finding_cells(finding: &Finding) -> [String; 5] {
    [
        finding.text.clone(),
        finding.file.display().to_string(),
        finding.label.clone(),
        finding
            .confidence
            .map(|c| format!("{c:.2}"))
            .unwrap_or_default(),
        finding.engine.clone(),
    ]
}
