//! Numeric answer evaluation
//!
//! Runs labelled questions through the pipeline and checks the first number in
//! each answer against a ground-truth value within a relative tolerance.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{QaError, Result};
use crate::orchestrator::HybridQa;
use crate::types::{FinalAnswer, Route};

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"));

/// A question with its expected numeric answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalExample {
    pub question: String,
    pub expected_value: f64,
    /// Relative tolerance, e.g. 0.05 for 5%
    pub tolerance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalRow {
    pub question: String,
    pub expected: f64,
    pub predicted: Option<f64>,
    pub relative_error: Option<f64>,
    pub correct: bool,
    /// `None` when the pipeline returned an error for this question.
    pub route: Option<Route>,
    pub sql_query: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub rows: Vec<EvalRow>,
}

/// Load examples from a JSON array file.
pub fn load_examples(path: &Path) -> Result<Vec<EvalExample>> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| QaError::Configuration(format!("Failed to parse eval examples {}: {}", path.display(), e)))
}

/// First decimal number in `text`, ignoring thousands separators.
pub fn extract_first_number(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    NUMBER.find(&cleaned).and_then(|m| m.as_str().parse().ok())
}

pub fn relative_error(predicted: f64, expected: f64) -> f64 {
    (predicted - expected).abs() / expected.abs().max(1e-9)
}

/// Score one pipeline answer.
pub fn score_answer(example: &EvalExample, answer: &FinalAnswer) -> EvalRow {
    let predicted = extract_first_number(&answer.answer);
    let relative_error = predicted.map(|p| relative_error(p, example.expected_value));
    EvalRow {
        question: example.question.clone(),
        expected: example.expected_value,
        predicted,
        relative_error,
        correct: relative_error.map(|e| e <= example.tolerance).unwrap_or(false),
        route: Some(answer.route),
        sql_query: answer.sql_query.clone(),
    }
}

pub fn summarize(rows: Vec<EvalRow>) -> EvalReport {
    let total = rows.len();
    let correct = rows.iter().filter(|r| r.correct).count();
    EvalReport {
        total,
        correct,
        accuracy: if total > 0 { correct as f64 / total as f64 } else { 0.0 },
        rows,
    }
}

/// Ask every example in order. A failed question counts as incorrect.
pub async fn evaluate(qa: &HybridQa, examples: &[EvalExample]) -> EvalReport {
    let mut rows = Vec::with_capacity(examples.len());
    for example in examples {
        let row = match qa.ask(&example.question).await {
            Ok(answer) => score_answer(example, &answer),
            Err(e) => {
                tracing::warn!(question = %example.question, error = %e, "Evaluation question failed");
                EvalRow {
                    question: example.question.clone(),
                    expected: example.expected_value,
                    predicted: None,
                    relative_error: None,
                    correct: false,
                    route: None,
                    sql_query: None,
                }
            }
        };
        rows.push(row);
    }

    let report = summarize(rows);
    tracing::info!(
        total = report.total,
        correct = report.correct,
        accuracy = report.accuracy,
        "Evaluation complete"
    );
    report
}

impl EvalReport {
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([
            "question",
            "expected",
            "predicted",
            "relative_error",
            "correct",
            "route",
            "sql_query",
        ])?;
        for row in &self.rows {
            writer.write_record([
                row.question.clone(),
                row.expected.to_string(),
                row.predicted.map(|v| v.to_string()).unwrap_or_default(),
                row.relative_error.map(|v| v.to_string()).unwrap_or_default(),
                row.correct.to_string(),
                row.route.map(|r| r.to_string()).unwrap_or_default(),
                row.sql_query.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Human-readable summary for the console.
    pub fn format(&self) -> String {
        format!(
            "Evaluated {} examples.\nAccuracy within tolerance: {:.2}%",
            self.total,
            self.accuracy * 100.0
        )
    }
}
