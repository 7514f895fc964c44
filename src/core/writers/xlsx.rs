// piiscan - core/writers/xlsx.rs
//
// Buffered XLSX document writer. An .xlsx file is a ZIP container of XML
// parts; the workbook is assembled directly with zip + hand-built sheet
// XML (inline strings only, no shared-string table). Three sheets:
// Findings (header row, auto-sized columns), Statistics, Metadata.

use super::{finding_cells, FindingsWriter, WriteMode};
use crate::core::model::Finding;
use crate::core::stats::Summary;
use crate::util::constants;
use crate::util::error::WriterError;
use quick_xml::escape::escape;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Widest column rendered before capping, in character units.
const MAX_COLUMN_WIDTH: usize = 80;

/// Buffering XLSX findings writer.
pub struct XlsxWriter {
    path: PathBuf,
    findings: Vec<Finding>,
    summary: Option<Summary>,
    closed: bool,
}

impl XlsxWriter {
    pub fn create(path: &Path) -> Result<Self, WriterError> {
        // Probe creatability up front; the container itself is written on
        // close.
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

    fn io_err(&self, e: std::io::Error) -> WriterError {
        WriterError::Io {
            path: self.path.clone(),
            source: e,
        }
    }

    fn zip_err(&self, e: zip::result::ZipError) -> WriterError {
        WriterError::Xlsx {
            path: self.path.clone(),
            source: e,
        }
    }
}

impl FindingsWriter for XlsxWriter {
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

        let file = File::create(&self.path).map_err(|e| self.io_err(e))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        let parts: [(&str, String); 6] = [
            ("[Content_Types].xml", content_types()),
            ("_rels/.rels", root_rels()),
            ("xl/workbook.xml", workbook()),
            ("xl/_rels/workbook.xml.rels", workbook_rels()),
            ("xl/worksheets/sheet1.xml", self.findings_sheet()),
            ("xl/worksheets/sheet2.xml", self.statistics_sheet()),
        ];
        for (name, content) in parts {
            zip.start_file(name, options).map_err(|e| self.zip_err(e))?;
            zip.write_all(content.as_bytes())
                .map_err(|e| self.io_err(e))?;
        }
        zip.start_file("xl/worksheets/sheet3.xml", options)
            .map_err(|e| self.zip_err(e))?;
        zip.write_all(metadata_sheet().as_bytes())
            .map_err(|e| self.io_err(e))?;

        let mut file = zip.finish().map_err(|e| self.zip_err(e))?;
        file.flush().map_err(|e| self.io_err(e))
    }
}

impl XlsxWriter {
    /// Findings sheet: header row plus one row per finding, columns sized
    /// to the widest cell.
    fn findings_sheet(&self) -> String {
        let header: Vec<String> = constants::FINDINGS_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .collect();
        let mut rows = vec![header];
        rows.extend(self.findings.iter().map(|f| finding_cells(f).to_vec()));
        sheet_xml(&rows)
    }

    /// Statistics sheet: key/value rows from the summary.
    fn statistics_sheet(&self) -> String {
        let mut rows = vec![vec!["statistic".to_string(), "value".to_string()]];
        if let Some(s) = &self.summary {
            rows.push(vec!["files_discovered".into(), s.files_discovered.to_string()]);
            rows.push(vec!["files_analyzed".into(), s.files_analyzed.to_string()]);
            rows.push(vec!["matches".into(), s.matches.to_string()]);
            rows.push(vec!["whitelisted".into(), s.whitelisted.to_string()]);
            rows.push(vec!["deduplicated".into(), s.deduplicated.to_string()]);
            rows.push(vec!["errors_total".into(), s.errors_total.to_string()]);
            rows.push(vec![
                "duration_secs".into(),
                format!("{:.2}", s.duration_secs),
            ]);
            for (kind, count) in &s.errors {
                rows.push(vec![format!("error:{kind}"), count.to_string()]);
            }
            for (ext, count) in &s.extensions {
                rows.push(vec![format!("extension:{ext}"), count.to_string()]);
            }
            for (engine, e) in &s.engines {
                rows.push(vec![
                    format!("engine:{engine}"),
                    format!("{} calls, {:.1}ms mean", e.invocations, e.mean_ms),
                ]);
            }
        }
        sheet_xml(&rows)
    }
}

fn metadata_sheet() -> String {
    sheet_xml(&[
        vec!["application".to_string(), constants::APP_NAME.to_string()],
        vec!["version".to_string(), constants::APP_VERSION.to_string()],
        vec![
            "generated_at".to_string(),
            chrono::Utc::now().to_rfc3339(),
        ],
    ])
}

/// Render rows as one worksheet part with auto-sized columns and inline
/// strings.
fn sheet_xml(rows: &[Vec<String>]) -> String {
    let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; column_count];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );
    if column_count > 0 {
        out.push_str("<cols>");
        for (i, width) in widths.iter().enumerate() {
            out.push_str(&format!(
                r#"<col min="{n}" max="{n}" width="{w}" customWidth="1"/>"#,
                n = i + 1,
                w = (*width).clamp(8, MAX_COLUMN_WIDTH) + 2
            ));
        }
        out.push_str("</cols>");
    }
    out.push_str("<sheetData>");
    for (row_idx, row) in rows.iter().enumerate() {
        out.push_str(&format!(r#"<row r="{}">"#, row_idx + 1));
        for (col_idx, cell) in row.iter().enumerate() {
            out.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                column_name(col_idx),
                row_idx + 1,
                escape(cell.as_str())
            ));
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>");
    out
}

/// Spreadsheet column name for a zero-based index (A, B, ..., Z, AA, ...).
fn column_name(mut index: usize) -> String {
    let mut name = String::new();
    loop {
        name.insert(0, (b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name
}

fn content_types() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/worksheets/sheet3.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#
        .to_string()
}

fn root_rels() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#
        .to_string()
}

fn workbook() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>
<sheet name="Findings" sheetId="1" r:id="rId1"/>
<sheet name="Statistics" sheetId="2" r:id="rId2"/>
<sheet name="Metadata" sheetId="3" r:id="rId3"/>
</sheets>
</workbook>"#
        .to_string()
}

fn workbook_rels() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet3.xml"/>
</Relationships>"#
        .to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::{MatchCounts, Statistics};
    use std::collections::BTreeMap;
    use std::io::Read;

    fn read_member(path: &Path, member: &str) -> String {
        let file = File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name(member).unwrap();
        let mut out = String::new();
        entry.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_workbook_parts_and_findings_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut writer = XlsxWriter::create(&path).unwrap();
        writer
            .write_finding(&Finding {
                text: "4111111111111111".to_string(),
                file: PathBuf::from("/scan/cards.txt"),
                label: "credit_card".to_string(),
                confidence: None,
                engine: "regex".to_string(),
                metadata: BTreeMap::new(),
            })
            .unwrap();
        let stats = Statistics::new();
        stats.freeze();
        writer
            .write_summary(&stats.snapshot(MatchCounts::default()))
            .unwrap();
        writer.close().unwrap();

        let workbook = read_member(&path, "xl/workbook.xml");
        assert!(workbook.contains("Findings"));
        assert!(workbook.contains("Statistics"));
        assert!(workbook.contains("Metadata"));

        let sheet = read_member(&path, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("match"), "header row present");
        assert!(sheet.contains("4111111111111111"));
        assert!(sheet.contains("customWidth"), "columns are auto-sized");
    }

    #[test]
    fn test_cells_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("escape.xlsx");
        let mut writer = XlsxWriter::create(&path).unwrap();
        writer
            .write_finding(&Finding {
                text: "Anna <anna@example.com> & Co".to_string(),
                file: PathBuf::from("/scan/a.txt"),
                label: "email".to_string(),
                confidence: Some(0.5),
                engine: "gliner".to_string(),
                metadata: BTreeMap::new(),
            })
            .unwrap();
        writer.close().unwrap();

        let sheet = read_member(&path, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("&lt;anna@example.com&gt; &amp; Co"));
    }

    #[test]
    fn test_column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
    }
}
