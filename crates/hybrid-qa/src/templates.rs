//! Instruction templates for the router, SQL translator, answerer, narrator and merger.
//!
//! Templates are data: the built-in defaults below can be replaced per deployment
//! from a JSON file (`PROMPTS_FILE`). Placeholders are `{name}`; braces that do not
//! name a known variable are left untouched.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QaError, Result};

pub const ROUTER_TEMPLATE: &str = r#"You are a routing classifier that must decide whether a question should be answered using:
- "sql"       -> only the SQL database
- "rag"       -> only the PDF/context documents
- "sql+rag"   -> SQL first, then RAG for extra descriptive context

===========================
WHEN TO USE SQL
===========================
Choose sql when the question:
- asks for counts ("how many", "number of", "count all")
- asks to list items ("list hotels", "show hotels", "names of")
- requests metrics: ADR, occupancy, rooms, revenue
- involves totals (SUM), averages (AVG), minimum, maximum
- asks for rankings ("best", "worst", "highest", "lowest")
- involves comparisons based on numeric data
- uses date filtering: 2024, 2025, yesterday, last month
- can be fully answered from structured tabular data

===========================
WHEN TO USE RAG
===========================
Choose rag when the question:
- asks for descriptions, features, amenities, views
- asks qualitative questions ("tell me about...", "describe...")
- requires content from PDFs (hotel profiles)
- cannot be answered from numeric data alone

===========================
WHEN TO USE SQL+RAG (HYBRID)
===========================
Choose sql+rag when BOTH structured numeric data AND document descriptions are needed.
Examples:
- "Which hotel performed best and why?"
- "Which hotel had highest ADR and what makes it unique?"
- "Compare hotels by occupancy and describe their differences."
- "Show the top hotel and summarize its amenities."

===========================
OUTPUT FORMAT
===========================
Return ONLY one route:
- sql
- rag
- sql+rag

Question: {question}"#;

pub const SQL_TEMPLATE: &str = r#"You are an expert SQL analyst. Generate ONLY a valid SQLite query for the table `{table}`.
The database is SQLite. It has no CURDATE(), NOW(), DATE_SUB(), DATE_FORMAT() or INTERVAL syntax.
The engine additionally provides YEAR(), MONTH() and DAY() for DATE values.

====================================================
DATE COLUMN RULE (CRITICAL)
====================================================
The table contains a REAL parsed DATE column:

    parsed_date_temp  (type: DATE, format YYYY-MM-DD)

There may also be a raw TEXT column `date` (format 'DD/MM/YYYY'). Do NOT use it for logic.

- ALWAYS use parsed_date_temp for ANY date filtering, comparison, grouping, ordering.
- NEVER invent or use columns like PARSED_DATE or PARSED_DATE_TEMP
  (only parsed_date_temp exists, with this exact lowercase name).
- To extract date parts, always use:
    YEAR(parsed_date_temp)
    MONTH(parsed_date_temp)
    DAY(parsed_date_temp)
- Relative dates use SQLite date functions on ISO strings:
    today:        date('now')
    yesterday:    parsed_date_temp = date('now', '-1 day')
    last 30 days: parsed_date_temp >= date('now', '-30 days')
    last month:   strftime('%Y-%m', parsed_date_temp) = strftime('%Y-%m', 'now', 'start of month', '-1 month')
    month bucket: strftime('%Y-%m', parsed_date_temp)

====================================================
AGGREGATION RULES
====================================================
1) NEVER SUM structural fields
   - Rooms_Available -> ALWAYS use MAX(Rooms_Available)

2) Allowed to SUM or AVG (daily-changing fields):
   - Rooms_Sold
   - ADR
   - ADR_Competition
   - Occupancy
   - Occupancy_Competition
   - Revenue -> (ADR * Rooms_Sold)

3) Do NOT SUM occupancy, ADR or any percentage/rate. Use AVG instead.

4) REVENUE RULE
   There is NO revenue column. Revenue is always computed as ADR * Rooms_Sold.

5) HOTEL LIST RULE
   If the question asks for a hotel list or count:
       SELECT DISTINCT hotel_name

====================================================
GROUP BY RULE
====================================================
- If you use ANY aggregate function (SUM, AVG, MAX, MIN, COUNT, etc.)
  together with non-aggregated columns in the SELECT list, you MUST add
  a GROUP BY clause listing EVERY non-aggregated column from SELECT.
- Example:
       SELECT t1.parsed_date_temp, t1.occupancy, AVG(t2.occupancy) AS occupancy_last_year
       ...
   MUST have:
       GROUP BY t1.parsed_date_temp, t1.occupancy;
- Do NOT select non-aggregated columns that are not listed in GROUP BY.

====================================================
EXTREME VALUE RULE (MAX/MIN/HIGHEST/BEST/WORST)
====================================================
If the question asks for highest, lowest, best, worst, max, min, peak,
record, strongest, weakest or busiest, then you MUST:
1. Compute the extreme value using a subquery.
2. Return ALL matching rows.
3. NEVER use LIMIT 1.
4. ALWAYS allow ties.

====================================================
YEAR-OVER-YEAR SAME-DAY RULE
====================================================
When the user asks for "same day last year", "what was the 2024 value on that day", etc.:
- Match rows using the same DAY + same MONTH for the same hotel.
- Compare YEAR(parsed_date_temp) = X with YEAR(parsed_date_temp) = X - 1.
- When comparing a metric between years on the same day, aggregate the
  "last year" side with AVG(...) so there is exactly ONE value per day
  (e.g. AVG(t2.occupancy) AS occupancy_last_year).

Pattern:
    JOIN {table} t2
    ON  t1.hotel_name = t2.hotel_name
    AND DAY(t1.parsed_date_temp) = DAY(t2.parsed_date_temp)
    AND MONTH(t1.parsed_date_temp) = MONTH(t2.parsed_date_temp)
    AND YEAR(t1.parsed_date_temp) = X
    AND YEAR(t2.parsed_date_temp) = X - 1

====================================================
SAFETY RULES
====================================================
- NEVER invent columns.
- NEVER reference any table other than {table}.
- NEVER output explanations.
- Output ONLY a valid SQL query.

====================================================
SCHEMA
{schema}

====================================================
USER QUESTION
{question}

Write ONLY the SQL query:"#;

pub const RAG_TEMPLATE: &str = r#"You are a helpful assistant that answers questions based **only** on the provided context.
If the answer is not in the context, say you don't know.

Context:
{context}

Question:
{question}

Answer in a clear and concise way."#;

pub const NARRATE_TEMPLATE: &str = r#"You are given a user's question and the raw result of an SQL query that answers it.
Explain the answer clearly and concisely in natural language.

Question:
{question}

SQL query:
{sql_query}

SQL result:
{sql_result}

Natural language answer:"#;

pub const MERGE_TEMPLATE: &str = r#"You are given:
- A user's question
- The result of an SQL query that computes exact numeric values relevant to the question
- A contextual answer from a RAG system over documents

Combine them into a single, coherent answer:
- Use the SQL result as the source of truth for any numeric values.
- Use the RAG answer only for qualitative/contextual explanation.
- If there is a conflict, trust the SQL numbers.

Question:
{question}

SQL query:
{sql_query}

SQL result:
{sql_result}

RAG context answer:
{rag_answer}

Final answer:"#;

/// The full set of instruction templates used by one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub router: String,
    pub sql: String,
    pub rag: String,
    pub narrate: String,
    pub merge: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            router: ROUTER_TEMPLATE.to_string(),
            sql: SQL_TEMPLATE.to_string(),
            rag: RAG_TEMPLATE.to_string(),
            narrate: NARRATE_TEMPLATE.to_string(),
            merge: MERGE_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Load overrides from JSON; fields missing from the file keep the built-ins.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QaError::Configuration(format!("Failed to read prompts file {}: {}", path.display(), e))
        })?;
        let templates: Self = serde_json::from_str(&content)
            .map_err(|e| QaError::Configuration(format!("Failed to parse prompts file: {}", e)))?;
        templates.validate()?;
        Ok(templates)
    }

    /// Every template must keep the placeholders its caller fills in.
    pub fn validate(&self) -> Result<()> {
        let required: Vec<(&str, &str, &[&str])> = vec![
            ("router", self.router.as_str(), &["question"][..]),
            ("sql", self.sql.as_str(), &["schema", "question"][..]),
            ("rag", self.rag.as_str(), &["context", "question"][..]),
            ("narrate", self.narrate.as_str(), &["question", "sql_result"][..]),
            ("merge", self.merge.as_str(), &["question", "sql_result", "rag_answer"][..]),
        ];
        for (name, template, vars) in required {
            for var in vars.iter() {
                if !template.contains(&format!("{{{}}}", var)) {
                    return Err(QaError::Configuration(format!(
                        "prompt template '{}' is missing the {{{}}} placeholder",
                        name, var
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Substituted values are never rescanned, so a question that itself contains
/// `{schema}` is passed through literally.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + vars.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| {
                let key = &after[..close];
                vars.iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| (*value, close))
            });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_known_placeholders() {
        let out = render("Q: {question} / T: {table}", &[("question", "How many?"), ("table", "hotels")]);
        assert_eq!(out, "Q: How many? / T: hotels");
    }

    #[test]
    fn test_render_leaves_unknown_braces() {
        let out = render("json {\"a\": 1} {question}", &[("question", "x")]);
        assert_eq!(out, "json {\"a\": 1} x");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render("{question}|{schema}", &[("question", "{schema}"), ("schema", "S")]);
        assert_eq!(out, "{schema}|S");
    }

    #[test]
    fn test_defaults_validate() {
        assert!(PromptTemplates::default().validate().is_ok());
    }

    #[test]
    fn test_sql_template_encodes_query_contracts() {
        let sql = &PromptTemplates::default().sql;
        assert!(sql.contains("parsed_date_temp"));
        assert!(sql.contains("MAX(Rooms_Available)"));
        assert!(sql.contains("ADR * Rooms_Sold"));
        assert!(sql.contains("NEVER use LIMIT 1"));
        assert!(sql.contains("SELECT DISTINCT hotel_name"));
        assert!(sql.contains("AVG(t2.occupancy)"));
        assert!(sql.contains("GROUP BY"));
        assert!(!sql.contains("ONLY_FULL_GROUP_BY"));
    }

    #[test]
    fn test_sql_template_teaches_sqlite_dates() {
        let sql = &PromptTemplates::default().sql;
        assert!(sql.contains("The database is SQLite"));
        assert!(sql.contains("date('now', '-1 day')"));
        assert!(sql.contains("strftime('%Y-%m', parsed_date_temp)"));
    }

    #[test]
    fn test_file_override_keeps_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{"rag":"Context: {context}\nQ: {question}"}"#).unwrap();

        let templates = PromptTemplates::from_file(&path).unwrap();
        assert_eq!(templates.rag, "Context: {context}\nQ: {question}");
        assert_eq!(templates.sql, SQL_TEMPLATE);
    }

    #[test]
    fn test_override_missing_placeholder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{"router":"Pick a route."}"#).unwrap();
        assert!(PromptTemplates::from_file(&path).is_err());
    }
}
