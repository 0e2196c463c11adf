//! Bulk CSV import into the permitted table.
//!
//! Column types are inferred from the data. A raw `date` column in `DD/MM/YYYY`
//! form gets a derived ISO `parsed_date_temp` column next to it.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

use super::store::quote_ident;
use crate::error::{QaError, Result};

pub const RAW_DATE_COLUMN: &str = "date";
pub const PARSED_DATE_COLUMN: &str = "parsed_date_temp";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Widen to fit a new non-empty cell.
    fn widen(self, cell: &str) -> Self {
        match self {
            ColumnType::Integer if cell.parse::<i64>().is_ok() => ColumnType::Integer,
            ColumnType::Integer | ColumnType::Real if cell.parse::<f64>().is_ok() => ColumnType::Real,
            _ => ColumnType::Text,
        }
    }

    fn convert(self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Integer => cell.parse().map(Value::Integer).unwrap_or(Value::Text(cell.into())),
            ColumnType::Real => cell.parse().map(Value::Real).unwrap_or(Value::Text(cell.into())),
            ColumnType::Text => Value::Text(cell.to_string()),
        }
    }
}

/// Drop and recreate `table` from the CSV at `csv_path`, in one transaction.
pub fn load_csv_into_table(conn: &mut Connection, csv_path: &Path, table: &str) -> Result<LoadReport> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.is_empty() {
        return Err(QaError::Ingestion(format!("{} has no header row", csv_path.display())));
    }

    let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;

    let mut types: Vec<Option<ColumnType>> = vec![None; headers.len()];
    for record in &records {
        for (i, cell) in record.iter().enumerate().take(headers.len()) {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            types[i] = Some(match types[i] {
                None => ColumnType::Integer.widen(cell),
                Some(t) => t.widen(cell),
            });
        }
    }
    let types: Vec<ColumnType> = types.into_iter().map(|t| t.unwrap_or(ColumnType::Text)).collect();

    let date_index = headers.iter().position(|h| h.eq_ignore_ascii_case(RAW_DATE_COLUMN));
    let derive_date = date_index.is_some() && !headers.iter().any(|h| h == PARSED_DATE_COLUMN);

    let mut columns = headers.clone();
    let mut definitions: Vec<String> = headers
        .iter()
        .zip(&types)
        .map(|(h, t)| format!("{} {}", quote_ident(h), t.sql()))
        .collect();
    if derive_date {
        columns.push(PARSED_DATE_COLUMN.to_string());
        definitions.push(format!("{} DATE", PARSED_DATE_COLUMN));
    }

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({defs});",
        table = quote_ident(table),
        defs = definitions.join(", ")
    ))?;

    {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(table),
            placeholders
        ))?;

        for record in &records {
            let mut values: Vec<Value> = (0..headers.len())
                .map(|i| types[i].convert(record.get(i).unwrap_or("").trim()))
                .collect();
            if derive_date {
                let parsed = date_index
                    .and_then(|i| record.get(i))
                    .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok())
                    .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null);
                values.push(parsed);
            }
            insert.execute(rusqlite::params_from_iter(values))?;
        }
    }
    tx.commit()?;

    tracing::info!(
        table = %table,
        rows = records.len(),
        columns = columns.len(),
        "Loaded CSV into table"
    );

    Ok(LoadReport {
        rows: records.len(),
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlStore;

    const CSV: &str = "hotel_name,date,Rooms_Available,Rooms_Sold,ADR,Occupancy,Notes\n\
St Regis Dubai,01/01/2025,300,257,1160.33,85.8,\n\
St Regis Dubai,02/01/2025,300,286,1210,95.4,sea view\n\
Premier Inn Al Furjan,15/03/2024,200,194,310.5,97,\n";

    fn write_csv(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("hotels.csv");
        std::fs::write(&path, CSV).unwrap();
        path
    }

    #[test]
    fn test_load_infers_types_and_derives_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path());
        let store = SqlStore::open_in_memory("dubai_hotels").unwrap();

        let report = store.replace_table_from_csv(&path).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.columns.last().map(String::as_str), Some(PARSED_DATE_COLUMN));

        let out = store
            .run("SELECT parsed_date_temp, YEAR(parsed_date_temp), Rooms_Available, ADR, Notes FROM dubai_hotels WHERE hotel_name = 'Premier Inn Al Furjan'")
            .unwrap();
        assert_eq!(out, "[('2024-03-15', 2024, 200, 310.5, None)]");

        let info = store.table_info().unwrap();
        assert!(info.contains("\"Rooms_Available\" INTEGER"));
        assert!(info.contains("\"ADR\" REAL"));
        assert!(info.contains("\"hotel_name\" TEXT"));
    }

    #[test]
    fn test_reload_replaces_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path());
        let store = SqlStore::open_in_memory("dubai_hotels").unwrap();

        let snapshot_sql = "SELECT * FROM dubai_hotels ORDER BY hotel_name, parsed_date_temp";

        store.replace_table_from_csv(&path).unwrap();
        let first = store.run(snapshot_sql).unwrap();
        let first_info = store.table_info().unwrap();

        store.replace_table_from_csv(&path).unwrap();
        assert_eq!(store.row_count().unwrap(), 3);
        assert_eq!(store.run(snapshot_sql).unwrap(), first);
        assert_eq!(store.table_info().unwrap(), first_info);
        assert!(first.contains("('St Regis Dubai', '02/01/2025', 300, 286, 1210.0, 95.4, 'sea view', '2025-01-02')"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let store = SqlStore::open_in_memory("dubai_hotels").unwrap();
        assert!(store.replace_table_from_csv(Path::new("/nonexistent/hotels.csv")).is_err());
    }

    #[test]
    fn test_column_type_widening() {
        assert_eq!(ColumnType::Integer.widen("12"), ColumnType::Integer);
        assert_eq!(ColumnType::Integer.widen("12.5"), ColumnType::Real);
        assert_eq!(ColumnType::Real.widen("7"), ColumnType::Real);
        assert_eq!(ColumnType::Real.widen("n/a"), ColumnType::Text);
        assert_eq!(ColumnType::Text.widen("3"), ColumnType::Text);
    }
}
