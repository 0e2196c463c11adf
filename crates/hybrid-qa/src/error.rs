//! Error types for the question answering pipeline

use thiserror::Error;

/// Errors surfaced by the routing, SQL, retrieval and ingestion layers.
#[derive(Error, Debug)]
pub enum QaError {
    /// Missing credential or invalid configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The generated SQL was empty or rejected by the query policy.
    #[error("Query generation failed: {0}")]
    QueryGeneration(String),

    /// The relational store rejected the generated SQL.
    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    /// Transport, HTTP status or payload failure talking to a model endpoint.
    #[error("External call failed: {0}")]
    ExternalCall(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl QaError {
    /// True for the failures the single-route SQL path degrades to retrieval on.
    pub fn is_structured_failure(&self) -> bool {
        matches!(self, Self::QueryGeneration(_) | Self::QueryExecution(_))
    }
}

impl From<rusqlite::Error> for QaError {
    fn from(err: rusqlite::Error) -> Self {
        Self::QueryExecution(err.to_string())
    }
}

impl From<reqwest::Error> for QaError {
    fn from(err: reqwest::Error) -> Self {
        Self::ExternalCall(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QaError>;
