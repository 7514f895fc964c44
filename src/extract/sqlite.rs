// piiscan - extract/sqlite.rs
//
// SQLite extraction: every text-column value in every table, one chunk
// per table. The database is opened read-only; row counts per table are
// bounded.

use super::TextExtractor;
use crate::core::model::TextContent;
use crate::util::constants;
use crate::util::error::ExtractError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// Table-chunked SQLite extractor.
pub struct SqliteExtractor;

impl TextExtractor for SqliteExtractor {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".db", ".sqlite", ".sqlite3"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/vnd.sqlite3", "application/x-sqlite3"]
    }

    fn extract(&self, path: &Path) -> Result<TextContent, ExtractError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ExtractError::Sqlite {
            path: path.to_path_buf(),
            source: e,
        })?;

        // The open is lazy; listing tables is the first real read and
        // surfaces corruption and not-a-database errors.
        let tables = list_tables(&conn).map_err(|e| ExtractError::Sqlite {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(path = %path.display(), tables = tables.len(), "SQLite opened");
        Ok(TextContent::Chunks(Box::new(TableChunks {
            conn,
            path: path.to_path_buf(),
            tables,
            next: 0,
        })))
    }
}

fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Lazy per-table chunk sequence.
struct TableChunks {
    conn: Connection,
    path: PathBuf,
    tables: Vec<String>,
    next: usize,
}

impl Iterator for TableChunks {
    type Item = Result<String, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.tables.get(self.next)?.clone();
        self.next += 1;
        Some(
            table_text(&self.conn, &table).map_err(|e| ExtractError::Sqlite {
                path: self.path.clone(),
                source: e,
            }),
        )
    }
}

/// All text-column values of one table, row-major.
fn table_text(conn: &Connection, table: &str) -> rusqlite::Result<String> {
    // Identifier quoting: double quotes, embedded quotes doubled.
    let quoted = format!("\"{}\"", table.replace('"', "\"\""));
    let sql = format!(
        "SELECT * FROM {quoted} LIMIT {}",
        constants::MAX_SQLITE_ROWS_PER_TABLE
    );
    let mut stmt = conn.prepare(&sql)?;
    let column_count = stmt.column_count();

    let mut out = String::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for col in 0..column_count {
            if let ValueRef::Text(bytes) = row.get_ref(col)? {
                out.push_str(&String::from_utf8_lossy(bytes));
                out.push(' ');
            }
        }
        out.push('\n');
    }
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
