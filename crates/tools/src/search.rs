//! Search tool: text search inside files and file-name search.
//!
//! Walks the working directory with `ignore` (so .gitignore is honoured)
//! on a blocking thread, filtering with `globset` include/exclude patterns
//! and extension lists. Text matching uses `regex`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use quill_core::tool::ToolResult;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::debug;

/// Files larger than this are not searched for text.
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Text,
    Files,
    #[default]
    Both,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default)]
    pub include_pattern: Option<String>,
    #[serde(default)]
    pub exclude_pattern: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub regex: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Extensions without the dot, e.g. `["rs", "toml"]`
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
}

fn default_max_results() -> usize {
    50
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_type: SearchType::default(),
            include_pattern: None,
            exclude_pattern: None,
            case_sensitive: false,
            whole_word: false,
            regex: false,
            max_results: default_max_results(),
            file_types: Vec::new(),
            include_hidden: false,
        }
    }
}

pub struct SearchTool {
    cwd: PathBuf,
}

impl SearchTool {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    pub async fn search(&self, query: &str, options: SearchOptions) -> ToolResult {
        let cwd = self.cwd.clone();
        let query = query.to_string();
        debug!(query = %query, search_type = ?options.search_type, "Searching");

        match tokio::task::spawn_blocking(move || search_blocking(&cwd, &query, &options)).await {
            Ok(Ok(output)) => ToolResult::ok(output),
            Ok(Err(e)) => ToolResult::fail(format!("Search failed: {e}")),
            Err(e) => ToolResult::fail(format!("Search failed: {e}")),
        }
    }
}

struct TextMatch {
    file: String,
    line: usize,
    text: String,
}

struct Filters {
    include: Option<GlobMatcher>,
    exclude: Option<GlobMatcher>,
    extensions: Vec<String>,
}

impl Filters {
    fn new(options: &SearchOptions) -> Result<Self, String> {
        let compile = |p: &Option<String>| -> Result<Option<GlobMatcher>, String> {
            p.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    Glob::new(s)
                        .map(|g| g.compile_matcher())
                        .map_err(|e| format!("Invalid glob pattern {s:?}: {e}"))
                })
                .transpose()
        };
        Ok(Self {
            include: compile(&options.include_pattern)?,
            exclude: compile(&options.exclude_pattern)?,
            extensions: options
                .file_types
                .iter()
                .map(|t| t.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        })
    }

    fn accepts(&self, rel: &str) -> bool {
        let name = rel.rsplit('/').next().unwrap_or(rel);
        let matches = |m: &GlobMatcher| m.is_match(rel) || m.is_match(name);

        if self.include.as_ref().is_some_and(|m| !matches(m)) {
            return false;
        }
        if self.exclude.as_ref().is_some_and(matches) {
            return false;
        }
        if !self.extensions.is_empty() {
            let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
            return ext.is_some_and(|e| self.extensions.contains(&e));
        }
        true
    }
}

fn build_regex(query: &str, options: &SearchOptions) -> Result<Regex, String> {
    let body = if options.regex {
        query.to_string()
    } else {
        regex::escape(query)
    };
    let pattern = if options.whole_word {
        format!(r"\b(?:{body})\b")
    } else {
        body
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(|e| format!("Invalid regex: {e}"))
}

fn walk_files(root: &Path, options: &SearchOptions, filters: &Filters) -> Vec<(PathBuf, String)> {
    let mut builder = WalkBuilder::new(root);
    builder.hidden(!options.include_hidden);
    builder.follow_links(false);
    builder.require_git(false);

    let mut out = Vec::new();
    for entry in builder.build() {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        if rel.components().any(|c| c.as_os_str() == ".git") {
            continue;
        }
        let rel = rel.to_string_lossy().replace('\\', "/");
        if filters.accepts(&rel) {
            out.push((path.to_path_buf(), rel));
        }
    }
    out.sort_by(|a, b| a.1.cmp(&b.1));
    out
}

fn read_text(path: &Path) -> Option<String> {
    let meta = std::fs::metadata(path).ok()?;
    if meta.len() > MAX_FILE_BYTES {
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    if bytes.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

fn search_blocking(root: &Path, query: &str, options: &SearchOptions) -> Result<String, String> {
    let re = build_regex(query, options)?;
    let filters = Filters::new(options)?;
    let files = walk_files(root, options, &filters);
    let limit = options.max_results.max(1);

    let mut sections = Vec::new();

    if options.search_type != SearchType::Files {
        let mut matches: Vec<TextMatch> = Vec::new();
        let mut limited = false;
        'files: for (path, rel) in &files {
            let Some(content) = read_text(path) else {
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                for _ in re.find_iter(line) {
                    if matches.len() == limit {
                        limited = true;
                        break 'files;
                    }
                    matches.push(TextMatch {
                        file: rel.clone(),
                        line: idx + 1,
                        text: line.trim().to_string(),
                    });
                }
            }
        }
        if !matches.is_empty() {
            let mut out = format!(
                "Found {}{} for \"{query}\":",
                plural(matches.len(), "match", "matches"),
                if limited { " (limited)" } else { "" }
            );
            let mut last: Option<(&str, usize)> = None;
            for m in &matches {
                // Several hits on one line are listed once
                if last == Some((m.file.as_str(), m.line)) {
                    continue;
                }
                out.push_str(&format!("\n{}:{}: {}", m.file, m.line, m.text));
                last = Some((m.file.as_str(), m.line));
            }
            sections.push(out);
        }
    }

    if options.search_type != SearchType::Text {
        let name_matcher = file_name_matcher(query, options, &re)?;
        let found: Vec<&str> = files
            .iter()
            .map(|(_, rel)| rel.as_str())
            .filter(|rel| name_matcher(rel))
            .take(limit)
            .collect();
        if !found.is_empty() {
            sections.push(format!(
                "Found {} matching \"{query}\":\n{}",
                plural(found.len(), "file", "files"),
                found.join("\n")
            ));
        }
    }

    if sections.is_empty() {
        return Ok(format!("No matches found for \"{query}\""));
    }
    Ok(sections.join("\n\n"))
}

/// File search treats a query with glob metacharacters as a glob and
/// anything else as the same pattern used for text search.
fn file_name_matcher<'a>(
    query: &str,
    options: &SearchOptions,
    re: &'a Regex,
) -> Result<Box<dyn Fn(&str) -> bool + 'a>, String> {
    if !options.regex && query.contains(['*', '?', '[']) {
        let glob = globset::GlobBuilder::new(query)
            .case_insensitive(!options.case_sensitive)
            .build()
            .map_err(|e| format!("Invalid glob pattern {query:?}: {e}"))?
            .compile_matcher();
        return Ok(Box::new(move |rel: &str| {
            let name = rel.rsplit('/').next().unwrap_or(rel);
            glob.is_match(rel) || glob.is_match(name)
        }));
    }
    Ok(Box::new(move |rel: &str| re.is_match(rel)))
}
