//! Console rendering shared by the interactive CLI and one-shot mode.

use hybrid_qa::FinalAnswer;

pub const BANNER: &str = "Hybrid SQL + RAG CLI. Type 'exit' or 'quit' to stop.";
pub const RAG_BANNER: &str = "RAG CLI. Type 'exit' or 'quit' to stop.";

/// Which pipeline entry point the CLI drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliMode {
    /// Route every question (the default).
    Hybrid,
    /// `--rag`: document retrieval only.
    DocumentsOnly,
}

impl CliMode {
    pub fn banner(&self) -> &'static str {
        match self {
            Self::Hybrid => BANNER,
            Self::DocumentsOnly => RAG_BANNER,
        }
    }
}

/// Split argv (without the program name) into a mode and an optional one-shot question.
pub fn parse_args<I>(args: I) -> (CliMode, Option<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Hybrid;
    let mut words = Vec::new();
    for arg in args {
        if arg == "--rag" {
            mode = CliMode::DocumentsOnly;
        } else {
            words.push(arg);
        }
    }
    let question = words.join(" ").trim().to_string();
    (mode, (!question.is_empty()).then_some(question))
}

/// Route line, optional SQL details, then the answer.
pub fn format_answer(answer: &FinalAnswer) -> String {
    let mut out = format!("[Route: {}]\n", answer.route);
    if let Some(sql) = answer.sql_query.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("SQL query: {}\n", sql));
    }
    if let Some(raw) = &answer.sql_raw_result {
        out.push_str(&format!("SQL raw result: {}\n", raw));
    }
    out.push_str(&format!("\nAnswer:\n{}", answer.answer));
    out
}

pub fn is_exit_command(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "exit" | "quit")
}
