//! Headless mode: run one prompt and print the result.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::ValueEnum;
use futures::StreamExt;
use quill_agent::AgentLoop;
use quill_core::chat::{ChatEntry, ChatEntryKind};
use quill_core::message::Message;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The final answer only
    Text,
    /// `{"messages": [...]}`
    Json,
    /// One streaming chunk per line as it happens
    StreamJson,
    /// One message per line
    Jsonl,
}

impl OutputFormat {
    fn is_json(self) -> bool {
        !matches!(self, Self::Text)
    }
}

pub struct HeadlessOptions {
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
    pub verbose: bool,
}

fn open_output(file: Option<&PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match file {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    })
}

pub async fn run(mut agent: AgentLoop, prompt: String, opts: &HeadlessOptions) -> anyhow::Result<ExitCode> {
    if opts.verbose {
        info!("Processing prompt with model: {}", agent.current_model());
        info!("Prompt: {prompt}");
    }

    let mut out = open_output(opts.output_file.as_ref())?;
    match produce(&mut agent, prompt, opts.format, &mut out).await {
        Ok(()) => {
            out.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let text = format!("Error: {e:#}");
            if opts.format.is_json() {
                let msg = serde_json::json!({ "role": "assistant", "content": text });
                writeln!(out, "{msg}")?;
            } else {
                writeln!(out, "{text}")?;
            }
            out.flush()?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn produce(
    agent: &mut AgentLoop,
    prompt: String,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if format == OutputFormat::StreamJson {
        return stream_json(agent, prompt, out).await;
    }

    let entries = agent.process_user_message(&prompt).await;
    let rendered = match format {
        OutputFormat::Json => render_json(&entries)?,
        OutputFormat::Jsonl => render_jsonl(&entries)?,
        OutputFormat::Text | OutputFormat::StreamJson => render_text(&entries),
    };
    out.write_all(rendered.as_bytes())?;
    Ok(())
}

async fn stream_json(agent: &mut AgentLoop, prompt: String, out: &mut dyn Write) -> anyhow::Result<()> {
    let stream = agent.process_user_message_stream(prompt);
    futures::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        writeln!(out, "{}", serde_json::to_string(&chunk)?)?;
        out.flush()?;
    }
    Ok(())
}

/// Convert chat entries into wire-shaped messages. Pending tool calls have
/// no message of their own and are skipped.
pub fn entries_to_messages(entries: &[ChatEntry]) -> Vec<Message> {
    entries
        .iter()
        .filter_map(|e| match e.kind {
            ChatEntryKind::User => Some(Message::user(&e.content)),
            ChatEntryKind::Assistant => Some(Message::assistant_with_tools(
                Some(e.content.clone()),
                e.tool_calls.clone(),
            )),
            ChatEntryKind::ToolResult => e
                .call_id()
                .map(|id| Message::tool_result(id, &e.content)),
            ChatEntryKind::ToolCall => None,
        })
        .collect()
}

pub fn render_text(entries: &[ChatEntry]) -> String {
    let answer = entries
        .iter()
        .rev()
        .find(|e| e.kind == ChatEntryKind::Assistant && !e.content.is_empty())
        .map_or("No response generated.", |e| e.content.as_str());
    format!("{answer}\n")
}

pub fn render_json(entries: &[ChatEntry]) -> anyhow::Result<String> {
    let body = serde_json::json!({ "messages": entries_to_messages(entries) });
    Ok(format!("{}\n", serde_json::to_string_pretty(&body)?))
}

pub fn render_jsonl(entries: &[ChatEntry]) -> anyhow::Result<String> {
    let mut out = String::new();
    for msg in entries_to_messages(entries) {
        out.push_str(&serde_json::to_string(&msg)?);
        out.push('\n');
    }
    Ok(out)
}
