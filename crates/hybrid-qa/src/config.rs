use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{QaError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub database: DatabaseSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub telegram: TelegramSettings,
    pub server: ServerSettings,
    /// Directory holding the documents to ingest and the CSV dataset.
    pub data_dir: PathBuf,
    /// Directory the vector index is persisted under.
    pub index_dir: PathBuf,
    /// Optional JSON file overriding the built-in instruction templates.
    #[serde(default)]
    pub prompts_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_key: String,
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Pre-built connection string; takes precedence over `path` when set.
    #[serde(default)]
    pub url: Option<String>,
    pub path: PathBuf,
    /// The single table the SQL translator may reference.
    pub table: String,
    /// Reject generated SQL that breaks the template rules instead of running it.
    #[serde(default)]
    pub strict_queries: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the answer prompt.
    pub k: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub webhook_url: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: String,
}

impl DatabaseSettings {
    /// Connection target handed to SQLite: the explicit URL or the file path.
    pub fn connection_target(&self) -> String {
        match &self.url {
            Some(url) if !url.trim().is_empty() => url
                .trim()
                .strip_prefix("sqlite://")
                .unwrap_or(url.trim())
                .to_string(),
            _ => self.path.display().to_string(),
        }
    }
}

impl QaConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            return Err(QaError::Configuration(
                "OPENAI_API_KEY is not set. Please configure it in your environment.".into(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(QaError::Configuration("llm.model must not be empty".into()));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(QaError::Configuration("embedding.model must not be empty".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(QaError::Configuration("embedding.dimension must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(QaError::Configuration("embedding.batch_size must be > 0".into()));
        }
        if !is_identifier(&self.database.table) {
            return Err(QaError::Configuration(format!(
                "database.table '{}' is not a plain SQL identifier",
                self.database.table
            )));
        }
        if self.chunking.chunk_size == 0 {
            return Err(QaError::Configuration("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(QaError::Configuration(
                "chunking.chunk_overlap must be < chunk_size".into(),
            ));
        }
        if self.retrieval.k == 0 {
            return Err(QaError::Configuration("retrieval.k must be > 0".into()));
        }
        Ok(())
    }

    /// Build the config from process environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("OPENAI_API_KEY") {
            config.llm.api_key = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            config.llm.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("OPENAI_MODEL") {
            config.llm.model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_DIMENSION") {
            config.embedding.dimension = parse_number("EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = get("DATABASE_URL") {
            config.database.url = Some(v);
        }
        if let Some(v) = get("DATABASE_PATH") {
            config.database.path = PathBuf::from(v);
        }
        if let Some(v) = get("SQL_TABLE") {
            config.database.table = v;
        }
        if let Some(v) = get("SQL_STRICT") {
            config.database.strict_queries = matches!(
                v.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(v) = get("DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("INDEX_DIR") {
            config.index_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CHUNK_SIZE") {
            config.chunking.chunk_size = parse_number("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            config.chunking.chunk_overlap = parse_number("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("RAG_TOP_K") {
            config.retrieval.k = parse_number("RAG_TOP_K", &v)?;
        }
        if let Some(v) = get("PROMPTS_FILE") {
            config.prompts_file = Some(PathBuf::from(v));
        }
        config.telegram.bot_token = get("TELEGRAM_BOT_TOKEN");
        config.telegram.webhook_url = get("WEBHOOK_URL");
        config.telegram.api_base = get("TELEGRAM_API_BASE");
        if let Some(v) = get("BIND_ADDR") {
            config.server.bind_addr = v;
        }

        Ok(config)
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QaError::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| QaError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings {
                api_key: String::new(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                max_tokens: 1024,
                temperature: 0.0,
            },
            embedding: EmbeddingSettings {
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
                batch_size: 64,
            },
            database: DatabaseSettings {
                url: None,
                path: PathBuf::from("data/hotels.db"),
                table: "dubai_hotels".to_string(),
                strict_queries: false,
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
                min_chunk_size: 1,
            },
            retrieval: RetrievalConfig { k: 4 },
            telegram: TelegramSettings::default(),
            server: ServerSettings {
                bind_addr: "127.0.0.1:8000".to_string(),
            },
            data_dir: PathBuf::from("data"),
            index_dir: PathBuf::from("vector_index"),
            prompts_file: None,
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| QaError::Configuration(format!("{} must be a positive integer, got '{}'", key, value)))
}

/// Plain `[A-Za-z_][A-Za-z0-9_]*` identifier check for table names.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
