//! Text editor tool: view, create, and string-replace edits.
//!
//! Paths are resolved against the injected working directory; messages
//! echo the path exactly as the model wrote it.

use std::path::{Path, PathBuf};

use quill_core::tool::ToolResult;
use tracing::debug;

/// Lines shown when a whole file is viewed without a range.
const PREVIEW_LINES: usize = 10;

pub struct TextEditorTool {
    cwd: PathBuf,
}

impl TextEditorTool {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }

    /// Show a directory listing, a file preview, or a line range.
    pub async fn view(&self, path: &str, range: Option<(usize, usize)>) -> ToolResult {
        let full = self.resolve(path);
        let meta = match tokio::fs::metadata(&full).await {
            Ok(m) => m,
            Err(_) => return ToolResult::fail(format!("File or directory not found: {path}")),
        };

        if meta.is_dir() {
            return match list_dir(&full).await {
                Ok(names) => ToolResult::ok(format!(
                    "Directory contents of {path}:\n{}",
                    names.join("\n")
                )),
                Err(e) => ToolResult::fail(format!("Error viewing {path}: {e}")),
            };
        }

        let content = match tokio::fs::read_to_string(&full).await {
            Ok(c) => c,
            Err(e) => return ToolResult::fail(format!("Error viewing {path}: {e}")),
        };
        let lines: Vec<&str> = content.lines().collect();

        match range {
            Some((start, end)) => view_range(path, &lines, start, end),
            None => {
                let mut out = format!("Contents of {path}:\n");
                out.push_str(&number_lines(&lines[..lines.len().min(PREVIEW_LINES)], 1));
                if lines.len() > PREVIEW_LINES {
                    out.push_str(&format!("\n... +{} lines", lines.len() - PREVIEW_LINES));
                }
                ToolResult::ok(out)
            }
        }
    }

    /// Write a new file, creating parent directories as needed.
    pub async fn create(&self, path: &str, content: &str) -> ToolResult {
        let full = self.resolve(path);
        debug!(path = %full.display(), bytes = content.len(), "Creating file");

        if let Some(parent) = full.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::fail(format!("Error creating {path}: {e}"));
            }
        }
        match tokio::fs::write(&full, content).await {
            Ok(()) => ToolResult::ok(format!("Created {path}")),
            Err(e) => ToolResult::fail(format!("Error creating {path}: {e}")),
        }
    }

    /// Replace the first (or every) occurrence of `old` with `new`.
    pub async fn str_replace(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> ToolResult {
        let full = self.resolve(path);
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolResult::fail(format!("File not found: {path}"));
            }
            Err(e) => return ToolResult::fail(format!("Error replacing text in {path}: {e}")),
        };

        if old.is_empty() || !content.contains(old) {
            return ToolResult::fail(format!("String not found in file: \"{old}\""));
        }

        let (updated, count) = if replace_all {
            (content.replace(old, new), content.matches(old).count())
        } else {
            (content.replacen(old, new, 1), 1)
        };

        match tokio::fs::write(&full, updated).await {
            Ok(()) => ToolResult::ok(format!("Updated {path}: replaced {count} occurrence(s)")),
            Err(e) => ToolResult::fail(format!("Error replacing text in {path}: {e}")),
        }
    }
}

fn view_range(path: &str, lines: &[&str], start: usize, end: usize) -> ToolResult {
    if start == 0 || start > lines.len() {
        return ToolResult::fail(format!(
            "Invalid start line {start}: {path} has {} lines",
            lines.len()
        ));
    }
    if end < start {
        return ToolResult::fail(format!("Invalid end line {end}: before start line {start}"));
    }
    let end = end.min(lines.len());
    ToolResult::ok(format!(
        "Lines {start}-{end} of {path}:\n{}",
        number_lines(&lines[start - 1..end], start)
    ))
}

fn number_lines(lines: &[&str], first: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}: {line}", first + i))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn list_dir(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
