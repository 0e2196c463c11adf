//! Question orchestration: route, answer, then narrate or merge.
//!
//! A request runs sequentially. The SQL-only route degrades to retrieval when
//! query generation or execution fails; the hybrid route does not.

use std::sync::Arc;
use std::time::Instant;

use crate::config::QaConfig;
use crate::embeddings::{EmbeddingModel, ExternalEmbeddings};
use crate::error::Result;
use crate::llm::{ExternalProvider, GenerationConfig, LLMProvider};
use crate::retrieval::{LanceRetriever, RetrievalAnswerer, Retriever};
use crate::router::QuestionRouter;
use crate::sql::{QueryPolicy, SqlStore, StructuredAnswerer};
use crate::templates::{render, PromptTemplates};
use crate::types::{FinalAnswer, Route, StructuredAnswer};

/// Tunables shared by the pipeline stages.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub generation: GenerationConfig,
    pub top_k: usize,
    pub policy: QueryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            top_k: 4,
            policy: QueryPolicy::default(),
        }
    }
}

pub struct HybridQa {
    llm: Arc<dyn LLMProvider>,
    router: QuestionRouter,
    sql: StructuredAnswerer,
    rag: RetrievalAnswerer,
    retriever: Arc<dyn Retriever>,
    narrate_template: String,
    merge_template: String,
    generation: GenerationConfig,
}

impl HybridQa {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        store: SqlStore,
        retriever: Arc<dyn Retriever>,
        templates: PromptTemplates,
        options: PipelineOptions,
    ) -> Self {
        let generation = options.generation;
        Self {
            router: QuestionRouter::new(llm.clone(), templates.router, &generation),
            sql: StructuredAnswerer::new(llm.clone(), store, templates.sql, &generation, options.policy),
            rag: RetrievalAnswerer::new(
                llm.clone(),
                retriever.clone(),
                templates.rag,
                &generation,
                options.top_k,
            ),
            retriever,
            llm,
            narrate_template: templates.narrate,
            merge_template: templates.merge,
            generation,
        }
    }

    /// Build the production pipeline: HTTP model endpoints, SQLite store, LanceDB index.
    pub fn from_config(config: &QaConfig) -> Result<Self> {
        config.validate()?;

        let templates = match &config.prompts_file {
            Some(path) => PromptTemplates::from_file(path)?,
            None => PromptTemplates::default(),
        };

        let llm: Arc<dyn LLMProvider> = Arc::new(ExternalProvider::from_settings(&config.llm)?);
        let embeddings: Arc<dyn EmbeddingModel> =
            Arc::new(ExternalEmbeddings::new(&config.llm, &config.embedding)?);
        let store = SqlStore::open(&config.database.connection_target(), &config.database.table)?;
        let retriever: Arc<dyn Retriever> = Arc::new(LanceRetriever::new(&config.index_dir, embeddings));

        tracing::info!(
            model = %config.llm.model,
            table = %config.database.table,
            index = %config.index_dir.display(),
            strict_queries = config.database.strict_queries,
            "Hybrid QA pipeline ready"
        );

        Ok(Self::new(
            llm,
            store,
            retriever,
            templates,
            PipelineOptions {
                generation: GenerationConfig::from(&config.llm),
                top_k: config.retrieval.k,
                policy: QueryPolicy::new(config.database.strict_queries),
            },
        ))
    }

    pub fn sql_store(&self) -> &SqlStore {
        self.sql.store()
    }

    /// Open the vector index now instead of on the first document question.
    pub async fn warm_up(&self) -> Result<()> {
        self.retriever.warm_up().await
    }

    pub async fn ask(&self, question: &str) -> Result<FinalAnswer> {
        let start = Instant::now();
        let route = self.router.classify(question).await?;

        let answer = match route {
            Route::Structured => self.answer_with_sql(question).await?,
            Route::Unstructured => self.answer_with_rag(question).await?,
            Route::Hybrid => self.answer_with_sql_and_rag(question).await?,
        };

        tracing::info!(
            routed = %route,
            answered = %answer.route,
            latency_ms = start.elapsed().as_millis() as u64,
            "Question answered"
        );
        Ok(answer)
    }

    /// Answer from the document index only, without consulting the router.
    pub async fn ask_documents(&self, question: &str) -> Result<FinalAnswer> {
        let start = Instant::now();
        let answer = self.answer_with_rag(question).await?;
        tracing::info!(
            answered = %answer.route,
            latency_ms = start.elapsed().as_millis() as u64,
            "Document question answered"
        );
        Ok(answer)
    }

    async fn answer_with_sql(&self, question: &str) -> Result<FinalAnswer> {
        let structured = match self.sql.answer_structured(question).await {
            Ok(structured) => structured,
            Err(e) if e.is_structured_failure() => {
                tracing::warn!(error = %e, "SQL route failed, falling back to retrieval");
                let rag = self.rag.answer_unstructured(question).await?;
                return Ok(FinalAnswer::unstructured(format!("(SQL route failed: {})\n\n{}", e, rag)));
            }
            Err(e) => return Err(e),
        };

        let answer = self.narrate(question, &structured).await?;
        Ok(FinalAnswer::with_sql(Route::Structured, answer, &structured))
    }

    async fn answer_with_rag(&self, question: &str) -> Result<FinalAnswer> {
        let answer = self.rag.answer_unstructured(question).await?;
        Ok(FinalAnswer::unstructured(answer))
    }

    async fn answer_with_sql_and_rag(&self, question: &str) -> Result<FinalAnswer> {
        let structured = self.sql.answer_structured(question).await?;
        let rag_answer = self.rag.answer_unstructured(question).await?;

        let prompt = render(
            &self.merge_template,
            &[
                ("question", question),
                ("sql_query", structured.sql.as_str()),
                ("sql_result", structured.raw_result.as_str()),
                ("rag_answer", rag_answer.as_str()),
            ],
        );
        let answer = self.llm.generate(&prompt, &self.generation).await?;
        Ok(FinalAnswer::with_sql(Route::Hybrid, answer.trim(), &structured))
    }

    async fn narrate(&self, question: &str, structured: &StructuredAnswer) -> Result<String> {
        let prompt = render(
            &self.narrate_template,
            &[
                ("question", question),
                ("sql_query", structured.sql.as_str()),
                ("sql_result", structured.raw_result.as_str()),
            ],
        );
        let answer = self.llm.generate(&prompt, &self.generation).await?;
        Ok(answer.trim().to_string())
    }
}
