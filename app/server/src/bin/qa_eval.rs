//! Score numeric answers against a labelled question set.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use hybrid_qa::eval::{evaluate, load_examples};
use hybrid_qa_server::{build_pipeline, init_tracing, load_config};

const RESULTS_FILE: &str = "hybrid_eval_results.csv";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(examples_path) = args.next().map(PathBuf::from) else {
        bail!("usage: qa-eval <examples.json> [results.csv]");
    };
    let results_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(RESULTS_FILE));

    let examples = load_examples(&examples_path)
        .with_context(|| format!("Failed to load {}", examples_path.display()))?;
    if examples.is_empty() {
        println!("No evaluation examples found in {}.", examples_path.display());
        return Ok(());
    }

    let config = load_config()?;
    let qa = build_pipeline(&config)?;

    let report = evaluate(&qa, &examples).await;
    println!("{}", report.format());

    report.write_csv(&results_path)?;
    println!("Saved detailed results to {}", results_path.display());
    Ok(())
}
