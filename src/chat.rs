//! Interactive conversation loop (`divelog chat`).
//!
//! Reads one line at a time, hands it to the [`DiveAgent`], and prints the
//! reply. The loop is generic over its input and output so tests can drive
//! it with in-memory buffers.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::agent::DiveAgent;
use crate::config::{self, Config};
use crate::llm::OpenAiChatModel;
use crate::store::DiveStore;
use crate::tools::{ToolContext, ToolRegistry};

const EXIT_PHRASES: [&str; 4] = ["quit", "exit", "bye", "goodbye"];

pub const FAREWELL: &str = "Goodbye! Happy diving!";

pub const APOLOGY: &str =
    "Sorry, I ran into a problem answering that. Please try again or rephrase your question.";

const BANNER: &str = "\
================================================================================
DIVE LOG ASSISTANT
================================================================================

Hey there! I'm your dive log assistant. Ask me about your dives, your dive
history, or tell me about a new dive to add to your log.
Type 'quit' or 'exit' to end the conversation.
";

/// Whether `input` ends the conversation.
pub fn is_exit_phrase(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    EXIT_PHRASES.contains(&normalized.as_str())
}

/// Run the conversation until an exit phrase or end of input.
pub async fn run_loop<R, W>(
    agent: &mut DiveAgent,
    input: R,
    mut output: W,
    show_tool_calls: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    output.write_all(BANNER.as_bytes()).await?;

    loop {
        output.write_all(b"\nYou: ").await?;
        output.flush().await?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_phrase(line) {
            break;
        }

        match agent.respond(line).await {
            Ok(reply) => {
                if show_tool_calls {
                    for call in &reply.tool_calls {
                        let status = if call.success { "ok" } else { "failed" };
                        output
                            .write_all(
                                format!(
                                    "  [tool] {}({}) -> {}\n",
                                    call.name, call.arguments, status
                                )
                                .as_bytes(),
                            )
                            .await?;
                    }
                }
                output
                    .write_all(format!("\nAssistant: {}\n", reply.text).as_bytes())
                    .await?;
            }
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "turn failed");
                output
                    .write_all(format!("\nAssistant: {}\n", APOLOGY).as_bytes())
                    .await?;
            }
        }
    }

    output
        .write_all(format!("\n{}\n", FAREWELL).as_bytes())
        .await?;
    output.flush().await?;
    Ok(())
}

/// Wire the store, tools and hosted model together and chat on stdin/stdout.
pub async fn run_chat(config: &Config) -> Result<()> {
    let api_key = config::require_api_key()?;
    let model = OpenAiChatModel::new(&config.model, api_key)?;
    let store = Arc::new(DiveStore::open(config).await?);

    let mut agent = DiveAgent::new(
        Arc::new(model),
        ToolRegistry::with_builtins(),
        ToolContext::new(store.clone()),
        config.model.max_tool_rounds,
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let result = run_loop(&mut agent, stdin, stdout, config.chat.show_tool_calls).await;

    store.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_phrases() {
        for phrase in ["quit", "EXIT", "  Bye  ", "GoodBye"] {
            assert!(is_exit_phrase(phrase), "{}", phrase);
        }
    }

    #[test]
    fn test_non_exit_phrases() {
        for phrase in ["", "quit now", "goodbye reef", "exiting"] {
            assert!(!is_exit_phrase(phrase), "{}", phrase);
        }
    }
}
