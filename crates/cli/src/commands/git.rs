//! `quill git commit-and-push`: stage everything, have the agent write a
//! conventional commit message, commit and push.

use std::process::ExitCode;

use quill_agent::AgentLoop;
use quill_core::chat::ChatEntryKind;
use quill_core::tool::ToolResult;
use tracing::debug;

use super::{SessionArgs, build_agent};

pub async fn commit_and_push(session: &SessionArgs) -> anyhow::Result<ExitCode> {
    session.enter_directory()?;
    let Some(config) = session.load_config()? else {
        return Ok(ExitCode::FAILURE);
    };
    let mut agent = build_agent(&config, None)?;

    println!("Processing commit and push...\n");
    Ok(if run_steps(&mut agent).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Each step prints one status line. Returns false at the first failure.
async fn run_steps(agent: &mut AgentLoop) -> bool {
    let status = agent.execute_bash_command("git status --porcelain").await;
    let changes = status.output().map(str::trim).unwrap_or_default().to_string();
    if !status.is_success() || changes.is_empty() {
        println!("No changes to commit. Working directory is clean.");
        return false;
    }
    println!("git status: Changes detected");

    let add = agent.execute_bash_command("git add .").await;
    if !add.is_success() {
        println!("git add: {}", failure_line(&add, "Failed to stage changes"));
        return false;
    }
    println!("git add: Changes staged");

    let diff = agent.execute_bash_command("git diff --cached").await;
    let diff = diff.output().unwrap_or("No staged changes shown");

    println!("Generating commit message...");
    let entries = agent.process_user_message(&commit_prompt(&changes, diff)).await;
    let message = entries
        .iter()
        .find(|e| e.kind == ChatEntryKind::Assistant && !e.content.trim().is_empty())
        .map(|e| strip_quotes(e.content.trim()).to_string());
    let Some(message) = message.filter(|m| !m.is_empty()) else {
        println!("Failed to generate commit message");
        return false;
    };
    println!("Generated commit message: \"{message}\"");

    let commit = agent
        .execute_bash_command(&format!("git commit -m {}", shell_quote(&message)))
        .await;
    if !commit.is_success() {
        println!("git commit: {}", failure_line(&commit, "Commit failed"));
        return false;
    }
    println!("git commit: {}", success_line(&commit, "Commit successful"));

    let mut push = agent.execute_bash_command("git push").await;
    if !push.is_success() && push.error().is_some_and(|e| e.contains("no upstream branch")) {
        println!("Setting upstream and pushing...");
        push = agent.execute_bash_command("git push -u origin HEAD").await;
    }
    if !push.is_success() {
        println!("git push: {}", failure_line(&push, "Push failed"));
        return false;
    }
    println!("git push: {}", success_line(&push, "Push successful"));
    debug!("Commit and push finished");
    true
}

fn commit_prompt(status: &str, diff: &str) -> String {
    format!(
        "Generate a concise, professional git commit message for these changes:\n\n\
         Git Status:\n{status}\n\n\
         Git Diff (staged changes):\n{diff}\n\n\
         Follow conventional commit format (feat:, fix:, docs:, etc.) and keep it under 72 characters.\n\
         Respond with ONLY the commit message, no additional text."
    )
}

/// Drop one leading and one trailing quote character.
fn strip_quotes(message: &str) -> &str {
    let message = message.strip_prefix(['"', '\'']).unwrap_or(message);
    message.strip_suffix(['"', '\'']).unwrap_or(message)
}

/// Single-quote a string for `sh -c`.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

fn success_line(result: &ToolResult, fallback: &str) -> String {
    result
        .output()
        .and_then(|o| o.lines().next())
        .filter(|l| !l.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn failure_line(result: &ToolResult, fallback: &str) -> String {
    result.error().unwrap_or(fallback).to_string()
}
