//! Text-to-SQL answering over a single permitted table.

pub mod loader;
pub mod policy;
pub mod store;

pub use loader::{load_csv_into_table, LoadReport};
pub use policy::QueryPolicy;
pub use store::SqlStore;

use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use crate::error::{QaError, Result};
use crate::llm::{GenerationConfig, LLMProvider};
use crate::templates::render;
use crate::types::StructuredAnswer;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:sql)?\s*(.*?)```").expect("valid regex"));

/// Translates a question into SQL against the store's table and runs it.
pub struct StructuredAnswerer {
    llm: Arc<dyn LLMProvider>,
    store: SqlStore,
    template: String,
    generation: GenerationConfig,
    policy: QueryPolicy,
}

impl StructuredAnswerer {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        store: SqlStore,
        template: String,
        generation: &GenerationConfig,
        policy: QueryPolicy,
    ) -> Self {
        Self {
            llm,
            store,
            template,
            generation: generation.clone(),
            policy,
        }
    }

    pub fn store(&self) -> &SqlStore {
        &self.store
    }

    pub fn build_prompt(&self, schema: &str, question: &str) -> String {
        render(
            &self.template,
            &[
                ("table", self.store.table()),
                ("schema", schema),
                ("question", question),
            ],
        )
    }

    /// Generate the query and execute it verbatim.
    pub async fn answer_structured(&self, question: &str) -> Result<StructuredAnswer> {
        let schema = self.store.table_info_async().await?;
        let prompt = self.build_prompt(&schema, question);

        let raw = self.llm.generate(&prompt, &self.generation).await?;
        let sql = strip_code_fences(&raw);
        if sql.is_empty() {
            return Err(QaError::QueryGeneration(
                "model returned an empty SQL query".into(),
            ));
        }
        self.policy.check(question, &sql)?;

        let start = Instant::now();
        let raw_result = self.store.run_async(sql.clone()).await?;
        tracing::info!(
            sql = %sql,
            result_len = raw_result.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Executed generated SQL"
        );

        Ok(StructuredAnswer { sql, raw_result })
    }
}

/// Take the inner text of a fenced block, or drop stray fence markers.
pub fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    if let Some(inner) = FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str().trim().to_string();
    }
    text.replace("```", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::store::tests::seeded_store;
    use crate::templates::SQL_TEMPLATE;
    use crate::testing::ScriptedProvider;

    fn answerer(llm: ScriptedProvider, policy: QueryPolicy) -> StructuredAnswerer {
        StructuredAnswerer::new(
            Arc::new(llm),
            seeded_store(),
            SQL_TEMPLATE.to_string(),
            &GenerationConfig::default(),
            policy,
        )
    }

    #[test]
    fn test_strip_fenced_block() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(strip_code_fences("```SQL SELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("Here:\n```\nSELECT 2\n```\nDone"), "SELECT 2");
    }

    #[test]
    fn test_strip_without_fences() {
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
        assert_eq!(strip_code_fences("```sql SELECT 3"), "sql SELECT 3");
        assert_eq!(strip_code_fences("``````"), "");
    }

    #[tokio::test]
    async fn test_prompt_carries_schema_and_question() {
        let llm = ScriptedProvider::new(|_| Ok("SELECT 1".into()));
        let answerer = answerer(llm.clone(), QueryPolicy::default());
        answerer.answer_structured("How many hotels?").await.unwrap();

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("CREATE TABLE dubai_hotels"));
        assert!(prompts[0].contains("for the table `dubai_hotels`"));
        assert!(prompts[0].contains("USER QUESTION\nHow many hotels?"));
    }

    #[tokio::test]
    async fn test_answer_executes_generated_query() {
        let llm = ScriptedProvider::new(|_| {
            Ok("```sql\nSELECT Occupancy FROM dubai_hotels WHERE hotel_name = 'St Regis Dubai' AND parsed_date_temp = '2025-01-01';\n```".into())
        });
        let answer = answerer(llm, QueryPolicy::default())
            .answer_structured("What was the occupancy of St Regis Dubai on 1 January 2025?")
            .await
            .unwrap();
        assert!(answer.sql.starts_with("SELECT Occupancy"));
        assert_eq!(answer.raw_result, "[(85.8,)]");
    }

    #[tokio::test]
    async fn test_empty_generation_is_error() {
        let llm = ScriptedProvider::new(|_| Ok("```sql\n```".into()));
        let err = answerer(llm, QueryPolicy::default())
            .answer_structured("anything")
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::QueryGeneration(_)));
    }

    #[tokio::test]
    async fn test_store_rejection_is_execution_error() {
        let llm = ScriptedProvider::new(|_| Ok("SELECT SUM(revenue) FROM dubai_hotels".into()));
        let err = answerer(llm, QueryPolicy::default())
            .answer_structured("Total revenue in 2025?")
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::QueryExecution(_)));
    }

    #[tokio::test]
    async fn test_strict_policy_blocks_before_execution() {
        let llm = ScriptedProvider::new(|_| {
            Ok("SELECT hotel_name FROM dubai_hotels ORDER BY ADR DESC LIMIT 1".into())
        });
        let err = answerer(llm, QueryPolicy::new(true))
            .answer_structured("Which hotel had the highest ADR?")
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::QueryGeneration(_)));
    }

    #[tokio::test]
    async fn test_revenue_is_computed() {
        let llm = ScriptedProvider::new(|_| {
            Ok("SELECT ROUND(SUM(ADR * Rooms_Sold), 2) AS revenue FROM dubai_hotels WHERE hotel_name = 'Premier Inn Al Furjan'".into())
        });
        let answer = answerer(llm, QueryPolicy::new(true))
            .answer_structured("What was the revenue of Premier Inn Al Furjan?")
            .await
            .unwrap();
        assert_eq!(answer.raw_result, "[(119310.0,)]");
    }
}
