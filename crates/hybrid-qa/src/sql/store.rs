use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use super::loader::{load_csv_into_table, LoadReport};
use crate::error::{QaError, Result};

/// Rows shown under the schema so the translator sees value formats.
const SAMPLE_ROWS: usize = 3;

/// Handle to the relational store, scoped to one permitted table.
///
/// The connection is opened once and shared; queries run on the blocking pool.
#[derive(Clone)]
pub struct SqlStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

#[derive(Clone, Copy)]
enum DatePart {
    Year,
    Month,
    Day,
}

impl SqlStore {
    /// Open a SQLite database by path or `file:` URI.
    pub fn open(target: &str, table: &str) -> Result<Self> {
        if let Some(parent) = Path::new(target).parent() {
            if !target.starts_with("file:") && !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let conn = Connection::open(target).map_err(|e| {
            QaError::Configuration(format!("Failed to open database {}: {}", target, e))
        })?;
        Self::from_connection(conn, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| QaError::Configuration(format!("Failed to open in-memory database: {}", e)))?;
        Self::from_connection(conn, table)
    }

    fn from_connection(conn: Connection, table: &str) -> Result<Self> {
        register_date_functions(&conn)
            .map_err(|e| QaError::Configuration(format!("Failed to register date functions: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Run a closure against the raw connection (seeding, maintenance).
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    /// `CREATE TABLE` statement of the permitted table plus a few sample rows.
    pub fn table_info(&self) -> Result<String> {
        let conn = self.conn.lock();
        let create_sql: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [&self.table],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let create_sql = create_sql.ok_or_else(|| {
            QaError::QueryExecution(format!("Table '{}' does not exist", self.table))
        })?;

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} LIMIT {}",
            quote_ident(&self.table),
            SAMPLE_ROWS
        ))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();

        let mut lines = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(render_plain(row.get_ref(i)?));
            }
            lines.push(values.join("\t"));
        }

        Ok(format!(
            "{}\n\n/*\n{} rows from {} table:\n{}\n{}\n*/",
            create_sql.trim(),
            lines.len(),
            self.table,
            columns.join("\t"),
            lines.join("\n")
        ))
    }

    /// Execute SQL verbatim and render the rows as `[(v1, v2), ...]`.
    /// A statement that yields no rows renders as an empty string.
    pub fn run(&self, sql: &str) -> Result<String> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();

        let mut rendered = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(render_literal(row.get_ref(i)?));
            }
            rendered.push(if values.len() == 1 {
                format!("({},)", values[0])
            } else {
                format!("({})", values.join(", "))
            });
        }

        if rendered.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("[{}]", rendered.join(", ")))
        }
    }

    pub async fn table_info_async(&self) -> Result<String> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.table_info())
            .await
            .map_err(|e| QaError::QueryExecution(format!("Schema task failed: {}", e)))?
    }

    pub async fn run_async(&self, sql: String) -> Result<String> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.run(&sql))
            .await
            .map_err(|e| QaError::QueryExecution(format!("Query task failed: {}", e)))?
    }

    /// Replace the permitted table with the contents of a CSV file.
    pub fn replace_table_from_csv(&self, csv_path: &Path) -> Result<LoadReport> {
        let mut conn = self.conn.lock();
        load_csv_into_table(&mut conn, csv_path, &self.table)
    }

    pub fn row_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Double-quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn register_date_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    for (name, part) in [("YEAR", DatePart::Year), ("MONTH", DatePart::Month), ("DAY", DatePart::Day)] {
        conn.create_scalar_function(name, 1, flags, move |ctx| {
            let value = match ctx.get_raw(0) {
                ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().and_then(|s| date_part(s, part)),
                _ => None,
            };
            Ok(value)
        })?;
    }
    Ok(())
}

/// Extract a component from `YYYY-MM-DD` (an optional time suffix is ignored).
fn date_part(value: &str, part: DatePart) -> Option<i64> {
    let date = NaiveDate::parse_from_str(value.trim().get(..10)?, "%Y-%m-%d").ok()?;
    Some(match part {
        DatePart::Year => date.year() as i64,
        DatePart::Month => date.month() as i64,
        DatePart::Day => date.day() as i64,
    })
}

fn render_real(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

fn render_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => render_real(f),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "\\'")),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

fn render_plain(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        other => render_literal(other),
    }
}
