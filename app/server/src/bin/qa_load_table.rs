//! Replace the configured SQL table with the contents of a CSV file.

use anyhow::{Context, Result};
use std::path::PathBuf;

use hybrid_qa::SqlStore;
use hybrid_qa_server::{init_tracing, load_config};

const DEFAULT_CSV: &str = "dubai_hotels_synthetic_daily_2y_enriched.csv";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = load_config()?;

    let csv_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.data_dir.join(DEFAULT_CSV));
    println!("Loading CSV from: {}", csv_path.display());

    let target = config.database.connection_target();
    println!("Connecting to SQLite at: {}", target);
    let store = SqlStore::open(&target, &config.database.table)?;

    let report = store
        .replace_table_from_csv(&csv_path)
        .with_context(|| format!("Failed to load {}", csv_path.display()))?;
    println!(
        "Wrote {} rows ({} columns) into table '{}'.",
        report.rows,
        report.columns.len(),
        config.database.table
    );
    Ok(())
}
