//! Interactive mode: a line-based REPL with streamed replies.
//!
//! Ctrl-C while a reply is streaming cancels that reply; the session
//! continues. Ctrl-C at the prompt, `exit`, `quit` or end of input leaves.

use std::future::Future;
use std::io::Write;

use futures::StreamExt;
use quill_agent::{AgentLoop, StreamingChunk};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

const PROMPT: &str = "> ";

pub async fn run(mut agent: AgentLoop) -> anyhow::Result<()> {
    println!("Quill ({}) in {}", agent.current_model(), agent.current_directory().display());
    println!("Type a request, or \"exit\" to quit. Ctrl-C cancels a running reply.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{PROMPT}");
        std::io::stdout().flush()?;

        let Some(line) = read_input(&mut lines, tokio::signal::ctrl_c()).await? else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit(input) {
            break;
        }

        respond(&mut agent, input.to_string()).await?;
    }
    Ok(())
}

/// Next input line, or `None` at end of input or when `interrupt` fires
/// first.
async fn read_input<R, I>(lines: &mut Lines<R>, interrupt: I) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => {
            debug!("Ctrl-C at the prompt");
            Ok(None)
        }
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input, "exit" | "quit")
}

async fn respond(agent: &mut AgentLoop, message: String) -> anyhow::Result<()> {
    let abort = agent.abort_handle();
    let stream = agent.process_user_message_stream(message);
    futures::pin_mut!(stream);

    let mut stdout = std::io::stdout();
    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            _ = tokio::signal::ctrl_c() => {
                debug!(cancelled = abort.abort(), "Ctrl-C");
                continue;
            }
        };
        let Some(chunk) = chunk else { break };
        if let Some(text) = render_chunk(&chunk) {
            write!(stdout, "{text}")?;
            stdout.flush()?;
        }
        if chunk.is_done() {
            break;
        }
    }
    writeln!(stdout)?;
    Ok(())
}

/// What to print for a chunk, if anything.
fn render_chunk(chunk: &StreamingChunk) -> Option<String> {
    match chunk {
        StreamingChunk::Content { content } => Some(content.clone()),
        StreamingChunk::ToolResult {
            tool_call,
            tool_result,
        } => {
            let text = tool_result.entry_text();
            let first = text.lines().next().unwrap_or_default();
            let marker = if tool_result.is_success() { "✓" } else { "✗" };
            Some(format!("\n{marker} {}: {first}\n", tool_call.name()))
        }
        StreamingChunk::TokenCount { .. } | StreamingChunk::ToolCalls { .. } | StreamingChunk::Done => None,
    }
}
