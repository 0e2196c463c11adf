use serde::{Deserialize, Serialize};
use std::fmt;

/// Answer strategy picked by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// Text-to-SQL over the relational table
    #[serde(rename = "sql")]
    Structured,
    /// Vector retrieval over ingested documents
    #[serde(rename = "rag")]
    Unstructured,
    /// SQL numbers merged with retrieved context
    #[serde(rename = "sql+rag")]
    Hybrid,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "sql",
            Self::Unstructured => "rag",
            Self::Hybrid => "sql+rag",
        }
    }

    /// Exact wire-name match; returns `None` for anything else.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "sql" => Some(Self::Structured),
            "rag" => Some(Self::Unstructured),
            "sql+rag" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn uses_sql(&self) -> bool {
        matches!(self, Self::Structured | Self::Hybrid)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generated SQL and the store's rendering of its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub sql: String,
    pub raw_result: String,
}

/// The only artifact returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub route: Route,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_raw_result: Option<String>,
}

impl FinalAnswer {
    pub fn unstructured(answer: impl Into<String>) -> Self {
        Self {
            route: Route::Unstructured,
            answer: answer.into(),
            sql_query: None,
            sql_raw_result: None,
        }
    }

    pub fn with_sql(route: Route, answer: impl Into<String>, sql: &StructuredAnswer) -> Self {
        Self {
            route,
            answer: answer.into(),
            sql_query: Some(sql.sql.clone()),
            sql_raw_result: Some(sql.raw_result.clone()),
        }
    }
}
