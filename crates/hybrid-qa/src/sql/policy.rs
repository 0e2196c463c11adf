//! Optional static checks on generated SQL, applied before execution.
//!
//! Off by default. When enabled, a query that breaks one of the translation
//! contracts is rejected as a generation failure instead of being executed.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{QaError, Result};
use crate::sql::loader::PARSED_DATE_COLUMN;

static EXTREME_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(highest|lowest|best|worst|max|maximum|min|minimum|peak|record|strongest|weakest|busiest)\b")
        .expect("valid regex")
});

static LIMIT_ONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\s+1\b").expect("valid regex"));

static REVENUE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brevenue\b").expect("valid regex"));

static REVENUE_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bas\s+revenue\b").expect("valid regex"));

static EXTREME_AGGREGATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(max|min)\s*\(").expect("valid regex"));

static SUBQUERY_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(select|from)\b").expect("valid regex"));

/// `date` identifier, with the opening paren captured when it is the SQLite function.
static RAW_DATE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdate\b(\s*\()?").expect("valid regex"));

static DATE_COLUMN_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bparsed_date(?:_temp)?\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPolicy {
    strict: bool,
}

impl QueryPolicy {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn check(&self, question: &str, sql: &str) -> Result<()> {
        if !self.strict {
            return Ok(());
        }

        let statements = split_statements(sql);
        if statements.len() != 1 {
            return reject(format!("expected one statement, found {}", statements.len()));
        }

        let first_word = statements[0]
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();
        if first_word != "SELECT" && first_word != "WITH" {
            return reject(format!("only read queries are allowed, got {}", first_word));
        }

        if EXTREME_WORDS.is_match(question) {
            if LIMIT_ONE.is_match(sql) {
                return reject("extreme-value question answered with LIMIT 1; ties would be dropped".into());
            }
            if !EXTREME_AGGREGATE.is_match(sql) {
                return reject("extreme-value question must compute MAX or MIN".into());
            }
        }

        if references_revenue_column(sql) {
            return reject("no revenue column exists; compute ADR * Rooms_Sold".into());
        }

        if RAW_DATE_REF
            .captures_iter(sql)
            .any(|caps| caps.get(1).is_none())
        {
            return reject(format!("raw date column used; use {}", PARSED_DATE_COLUMN));
        }

        if let Some(bad) = DATE_COLUMN_REF
            .find_iter(sql)
            .map(|m| m.as_str())
            .find(|name| *name != PARSED_DATE_COLUMN)
        {
            return reject(format!("unknown date column {}; use {}", bad, PARSED_DATE_COLUMN));
        }

        Ok(())
    }
}

/// True when `revenue` is read as a column rather than as a computed alias.
///
/// A reference counts as an alias use when it follows an `AS revenue`, or when
/// a subquery boundary separates it from the alias it precedes.
fn references_revenue_column(sql: &str) -> bool {
    let aliases: Vec<(usize, usize)> = REVENUE_ALIAS
        .find_iter(sql)
        .map(|m| (m.start(), m.end()))
        .collect();
    if aliases.is_empty() {
        return REVENUE_REF.is_match(sql);
    }

    REVENUE_REF
        .find_iter(sql)
        .filter(|r| !aliases.iter().any(|&(start, end)| r.start() >= start && r.end() <= end))
        .any(|r| match aliases.iter().find(|&&(start, _)| start >= r.end()) {
            Some(&(start, _)) => !SUBQUERY_BOUNDARY.is_match(&sql[r.end()..start]),
            None => false,
        })
}

fn reject(reason: String) -> Result<()> {
    tracing::warn!(reason = %reason, "Generated SQL rejected by query policy");
    Err(QaError::QueryGeneration(format!("query policy: {}", reason)))
}

/// Split on `;` outside single-quoted literals, dropping empty statements.
fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    for (i, c) in sql.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => {
                statements.push(&sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    statements.push(&sql[start..]);
    statements.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> QueryPolicy {
        QueryPolicy::new(true)
    }

    #[test]
    fn test_lenient_accepts_anything() {
        assert!(QueryPolicy::default().check("q", "DROP TABLE dubai_hotels").is_ok());
    }

    #[test]
    fn test_single_read_statement() {
        assert!(strict().check("q", "SELECT 1;").is_ok());
        assert!(strict().check("q", "WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert!(strict().check("q", "SELECT 1; SELECT 2").is_err());
        assert!(strict().check("q", "DELETE FROM dubai_hotels").is_err());
        assert!(strict().check("q", "SELECT ';' AS semi").is_ok());
    }

    #[test]
    fn test_limit_one_rejected_for_extremes() {
        let sql = "SELECT hotel_name FROM dubai_hotels WHERE ADR = (SELECT MAX(ADR) FROM dubai_hotels) LIMIT 1";
        let err = strict().check("Which hotel had the highest ADR?", sql).unwrap_err();
        assert!(matches!(err, QaError::QueryGeneration(_)));
        assert!(strict().check("Show one hotel", sql).is_ok());
        assert!(strict()
            .check(
                "Which hotel had the highest ADR?",
                "SELECT hotel_name FROM dubai_hotels WHERE ADR = (SELECT MAX(ADR) FROM dubai_hotels)"
            )
            .is_ok());
    }

    #[test]
    fn test_extremes_need_max_or_min() {
        let sorted = "SELECT hotel_name, ADR FROM dubai_hotels ORDER BY ADR DESC LIMIT 5";
        assert!(strict().check("Which hotel had the highest ADR?", sorted).is_err());
        assert!(strict().check("List hotels by ADR", sorted).is_ok());
        assert!(strict()
            .check(
                "What was the lowest occupancy?",
                "SELECT parsed_date_temp FROM dubai_hotels WHERE Occupancy = (SELECT min (Occupancy) FROM dubai_hotels)"
            )
            .is_ok());
    }

    #[test]
    fn test_revenue_must_be_computed() {
        assert!(strict().check("q", "SELECT SUM(revenue) FROM dubai_hotels").is_err());
        assert!(strict()
            .check("Total revenue?", "SELECT SUM(revenue) AS revenue FROM dubai_hotels")
            .is_err());
        assert!(strict()
            .check("q", "SELECT SUM(ADR * Rooms_Sold) AS revenue FROM dubai_hotels ORDER BY revenue")
            .is_ok());
        assert!(strict()
            .check(
                "q",
                "SELECT hotel_name, revenue FROM (SELECT hotel_name, SUM(ADR * Rooms_Sold) AS revenue FROM dubai_hotels GROUP BY hotel_name)"
            )
            .is_ok());
        assert!(strict()
            .check("q", "SELECT SUM(ADR * Rooms_Sold) AS total_revenue FROM dubai_hotels")
            .is_ok());
    }

    #[test]
    fn test_raw_date_column_rejected() {
        assert!(strict()
            .check("q", "SELECT * FROM dubai_hotels WHERE date = '01/01/2025'")
            .is_err());
        assert!(strict()
            .check("q", "SELECT * FROM dubai_hotels WHERE parsed_date_temp = date('now', '-1 day')")
            .is_ok());
        assert!(strict()
            .check("q", "SELECT * FROM dubai_hotels WHERE parsed_date_temp >= DATE ('now', '-30 days')")
            .is_ok());
    }

    #[test]
    fn test_date_column_spelling() {
        assert!(strict()
            .check("q", "SELECT * FROM dubai_hotels WHERE YEAR(parsed_date_temp) = 2025")
            .is_ok());
        assert!(strict()
            .check("q", "SELECT * FROM dubai_hotels WHERE YEAR(PARSED_DATE) = 2025")
            .is_err());
        assert!(strict()
            .check("q", "SELECT * FROM dubai_hotels WHERE YEAR(PARSED_DATE_TEMP) = 2025")
            .is_err());
    }
}
