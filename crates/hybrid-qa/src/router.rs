//! LLM-based route classifier
//!
//! One generation call decides between the SQL, document and hybrid strategies.
//! Anything the model answers outside the three route labels resolves to the
//! document route: a descriptive answer is preferred over a possibly wrong number.

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::llm::{GenerationConfig, LLMProvider};
use crate::templates::render;
use crate::types::Route;

/// Route labels are a single short token.
const ROUTER_MAX_TOKENS: usize = 10;

pub struct QuestionRouter {
    llm: Arc<dyn LLMProvider>,
    template: String,
    generation: GenerationConfig,
}

impl QuestionRouter {
    pub fn new(llm: Arc<dyn LLMProvider>, template: String, generation: &GenerationConfig) -> Self {
        Self {
            llm,
            template,
            generation: generation.with_max_tokens(ROUTER_MAX_TOKENS),
        }
    }

    pub fn build_prompt(&self, question: &str) -> String {
        render(&self.template, &[("question", question)])
    }

    /// Classify a question. Transport failures propagate; unknown labels do not.
    pub async fn classify(&self, question: &str) -> Result<Route> {
        let prompt = self.build_prompt(question);

        let start = Instant::now();
        let raw = self.llm.generate(&prompt, &self.generation).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let route = resolve_route(&raw);
        tracing::info!(
            route = %route,
            raw = %raw.trim(),
            latency_ms = latency_ms,
            "Router decision"
        );
        Ok(route)
    }
}

/// Parse the classifier's reply into a route label, if it is one.
pub fn parse_route(raw: &str) -> Option<Route> {
    let cleaned = raw
        .trim()
        .trim_end_matches('.')
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_lowercase();
    Route::from_label(&cleaned)
}

/// Parse the classifier's reply, falling back to the document route.
pub fn resolve_route(raw: &str) -> Route {
    parse_route(raw).unwrap_or_else(|| {
        tracing::debug!(raw = %raw, "Unrecognized route label, falling back to rag");
        Route::Unstructured
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QaError;
    use crate::templates::ROUTER_TEMPLATE;
    use crate::testing::ScriptedProvider;

    fn router(llm: ScriptedProvider) -> QuestionRouter {
        QuestionRouter::new(
            Arc::new(llm),
            ROUTER_TEMPLATE.to_string(),
            &GenerationConfig::default(),
        )
    }

    #[test]
    fn test_parse_exact_labels() {
        assert_eq!(parse_route("sql"), Some(Route::Structured));
        assert_eq!(parse_route("rag"), Some(Route::Unstructured));
        assert_eq!(parse_route("sql+rag"), Some(Route::Hybrid));
    }

    #[test]
    fn test_parse_trims_and_lowercases() {
        assert_eq!(parse_route("  SQL\n"), Some(Route::Structured));
        assert_eq!(parse_route("Sql+Rag"), Some(Route::Hybrid));
        assert_eq!(parse_route("`sql`"), Some(Route::Structured));
        assert_eq!(parse_route("\"rag\"."), Some(Route::Unstructured));
    }

    #[test]
    fn test_unrecognized_falls_back_to_rag() {
        assert_eq!(resolve_route("I think SQL is best here"), Route::Unstructured);
        assert_eq!(resolve_route(""), Route::Unstructured);
        assert_eq!(resolve_route("sql + rag"), Route::Unstructured);
        assert_eq!(resolve_route("hybrid"), Route::Unstructured);
    }

    #[test]
    fn test_prompt_embeds_question_and_criteria() {
        let router = router(ScriptedProvider::new(|_| Ok("sql".into())));
        let prompt = router.build_prompt("How many hotels had occupancy above 90% in 2025?");
        assert!(prompt.ends_with("Question: How many hotels had occupancy above 90% in 2025?"));
        assert!(prompt.contains("asks for rankings"));
        assert!(prompt.contains("uses date filtering"));
        assert!(prompt.contains("Which hotel performed best and why?"));
    }

    #[tokio::test]
    async fn test_classify_uses_model_reply() {
        let llm = ScriptedProvider::new(|_| Ok(" sql+rag \n".into()));
        let route = router(llm.clone())
            .classify("Which hotel had the highest ADR and why?")
            .await
            .unwrap();
        assert_eq!(route, Route::Hybrid);
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_classify_propagates_transport_failure() {
        let llm = ScriptedProvider::new(|_| Err(QaError::ExternalCall("connection reset".into())));
        let err = router(llm).classify("Describe the spa").await.unwrap_err();
        assert!(matches!(err, QaError::ExternalCall(_)));
    }
}
