//! Ask one question from the command line, or chat interactively.
//!
//! `qa-cli [--rag] [question...]`; `--rag` answers from documents only.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use hybrid_qa::HybridQa;
use hybrid_qa_server::cli::{format_answer, is_exit_command, parse_args, CliMode};
use hybrid_qa_server::{build_pipeline, init_tracing, load_config};

async fn answer(qa: &HybridQa, mode: CliMode, question: &str) {
    let result = match mode {
        CliMode::Hybrid => qa.ask(question).await,
        CliMode::DocumentsOnly => qa.ask_documents(question).await,
    };
    match result {
        Ok(result) => println!("{}", format_answer(&result)),
        Err(e) => eprintln!("Error: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = load_config()?;
    let qa = build_pipeline(&config)?;

    let (mode, question) = parse_args(std::env::args().skip(1));
    if let Some(question) = question {
        answer(&qa, mode, &question).await;
        return Ok(());
    }

    println!("{}", mode.banner());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nQuestion: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!("\nGoodbye.");
            break;
        };
        let line = line.trim();
        if is_exit_command(line) {
            println!("Goodbye.");
            break;
        }
        if line.is_empty() {
            continue;
        }
        println!();
        answer(&qa, mode, line).await;
    }
    Ok(())
}
