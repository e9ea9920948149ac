//! Interactive question loop.
//!
//! Each non-blank line is one independent turn. A failed turn prints
//! `Error: ...` and the loop carries on; only EOF or an exit word ends the
//! session.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::agent::{run_turn, AgentContext, AgentSettings};
use crate::config::Config;
use crate::embedding::{create_provider, resolve_local_model};
use crate::index::VectorIndex;
use crate::llm::OpenAiCompatibleChat;
use crate::tools::{RetrieverTool, ToolRegistry};

pub const PROMPT: &str = "\nUser > ";
pub const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "q"];
const SEPARATOR_WIDTH: usize = 50;

/// Counts reported when the session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub answered: usize,
    pub failed: usize,
}

/// True when the trimmed line is one of [`EXIT_COMMANDS`], ignoring case.
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS.iter().any(|c| line.eq_ignore_ascii_case(c))
}

/// Run turns for each line of `reader` until EOF or an exit command.
pub async fn run_session<R, W>(ctx: &AgentContext, mut reader: R, mut writer: W) -> Result<SessionSummary>
where
    R: BufRead,
    W: Write,
{
    let mut summary = SessionSummary::default();
    let mut buf = Vec::new();

    loop {
        write!(writer, "{}", PROMPT)?;
        writer.flush()?;

        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("Failed to read input")?;
        if read == 0 {
            writeln!(writer)?;
            writeln!(writer, "Goodbye!")?;
            break;
        }

        // Undecodable input is a failed turn, not the end of the session.
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("unreadable input line: {}", e);
                writeln!(writer, "Error: input is not valid UTF-8 ({})", e)?;
                summary.failed += 1;
                continue;
            }
        };
        if is_exit_command(line) {
            writeln!(writer, "Goodbye!")?;
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match run_turn(ctx, input).await {
            Ok(answer) => {
                writeln!(writer, " AI: {}", answer)?;
                writeln!(writer, "{}", "-".repeat(SEPARATOR_WIDTH))?;
                summary.answered += 1;
            }
            Err(e) => {
                tracing::warn!("turn failed: {:#}", e);
                writeln!(writer, "Error: {:#}", e)?;
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// `docqa chat`: set up the agent and run the session on stdin/stdout.
///
/// Startup order matters: the credential is checked first and the index is
/// loaded before the embedding model, so the common misconfigurations fail
/// fast. Every startup error is fatal.
pub async fn run_chat(config: &Config) -> Result<SessionSummary> {
    println!("--- Initializing the Agent ---");
    let api_key = config.llm.api_key()?;

    println!("Loading vector database...");
    let (embedding_model, _) = resolve_local_model(&config.embedding);
    let index = VectorIndex::load(&config.index.dir, Some(&embedding_model))?;
    let provider = create_provider(&config.embedding)?;

    println!("Connecting to {}...", config.llm.model);
    let chat = OpenAiCompatibleChat::new(&config.llm, api_key)?;
    tracing::info!(
        endpoint = chat.endpoint(),
        chunks = index.len(),
        embedding_model = index.model(),
        built = index.created_at(),
        "agent ready"
    );

    let mut tools = ToolRegistry::new();
    tools.register(Box::new(RetrieverTool::new(
        &config.tool,
        &config.retrieval,
        Arc::new(index),
        Arc::from(provider),
    )));
    let ctx = AgentContext::new(Box::new(chat), tools, AgentSettings::from_config(config));

    let summary = run_session(&ctx, std::io::stdin().lock(), std::io::stdout()).await?;
    tracing::info!(answered = summary.answered, failed = summary.failed, "session ended");
    Ok(summary)
}
