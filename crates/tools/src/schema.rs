//! Argument types and JSON schemas for the built-in tools.
//!
//! The schemas are what the model sees; the argument structs are what the
//! dispatcher deserializes the model's `arguments` string into.

use quill_core::provider::ToolDefinition;
use serde::Deserialize;
use serde_json::json;

use crate::search::SearchOptions;
use crate::todo::{TodoItem, TodoUpdate};

#[derive(Debug, Deserialize)]
pub struct ViewFileArgs {
    pub path: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

impl ViewFileArgs {
    /// A range needs a start; a missing end means a single line.
    pub fn range(&self) -> Option<(usize, usize)> {
        self.start_line
            .map(|start| (start, self.end_line.unwrap_or(start)))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFileArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct StrReplaceArgs {
    pub path: String,
    pub old_str: String,
    pub new_str: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Deserialize)]
pub struct EditFileArgs {
    pub target_file: String,
    pub instructions: String,
    pub code_edit: String,
}

#[derive(Debug, Deserialize)]
pub struct BashArgs {
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(flatten)]
    pub options: SearchOptions,
}

#[derive(Debug, Deserialize)]
pub struct CreateTodoListArgs {
    pub todos: Vec<TodoItem>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTodoListArgs {
    pub updates: Vec<TodoUpdate>,
}

fn def(name: &str, description: &str, parameters: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

/// Schemas for every built-in tool, in a stable order. `edit_file` is
/// listed only when Morph Fast Apply is configured.
pub fn builtin_definitions(morph_enabled: bool) -> Vec<ToolDefinition> {
    let mut defs = vec![
        def(
            "view_file",
            "View contents of a file or list directory contents",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to file or directory to view" },
                    "start_line": { "type": "number", "description": "Starting line number for partial file view (optional)" },
                    "end_line": { "type": "number", "description": "Ending line number for partial file view (optional)" }
                },
                "required": ["path"]
            }),
        ),
        def(
            "create_file",
            "Create a new file with specified content",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path where the file should be created" },
                    "content": { "type": "string", "description": "Content to write to the file" }
                },
                "required": ["path", "content"]
            }),
        ),
        def(
            "str_replace_editor",
            "Replace specific text in a file. Use this for single line edits only",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to the file to edit" },
                    "old_str": { "type": "string", "description": "Text to replace (must match exactly, or will use fuzzy matching for multi-line strings)" },
                    "new_str": { "type": "string", "description": "Text to replace with" },
                    "replace_all": { "type": "boolean", "description": "Replace all occurrences (default: false, only replaces first occurrence)" }
                },
                "required": ["path", "old_str", "new_str"]
            }),
        ),
    ];

    if morph_enabled {
        defs.push(def(
            "edit_file",
            "Use this tool to make an edit to an existing file. Write only the lines that change, \
             and mark unchanged spans with `// ... existing code ...`. Make all edits to a file \
             in a single call.",
            json!({
                "type": "object",
                "properties": {
                    "target_file": { "type": "string", "description": "The target file to modify." },
                    "instructions": { "type": "string", "description": "A single sentence in first person describing the edit." },
                    "code_edit": { "type": "string", "description": "Only the lines to change, with `// ... existing code ...` for unchanged spans." }
                },
                "required": ["target_file", "instructions", "code_edit"]
            }),
        ));
    }

    defs.extend([
        def(
            "bash",
            "Execute a bash command",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The bash command to execute" }
                },
                "required": ["command"]
            }),
        ),
        def(
            "search",
            "Unified search tool for finding text content or files (similar to Cursor's search)",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Text to search for or file name/path pattern" },
                    "search_type": { "type": "string", "enum": ["text", "files", "both"], "description": "Type of search: 'text' for content search, 'files' for file names, 'both' for both (default: 'both')" },
                    "include_pattern": { "type": "string", "description": "Glob pattern for files to include (e.g. '*.ts', '*.js')" },
                    "exclude_pattern": { "type": "string", "description": "Glob pattern for files to exclude (e.g. '*.log', 'node_modules')" },
                    "case_sensitive": { "type": "boolean", "description": "Whether search should be case sensitive (default: false)" },
                    "whole_word": { "type": "boolean", "description": "Whether to match whole words only (default: false)" },
                    "regex": { "type": "boolean", "description": "Whether query is a regex pattern (default: false)" },
                    "max_results": { "type": "number", "description": "Maximum number of results to return (default: 50)" },
                    "file_types": { "type": "array", "items": { "type": "string" }, "description": "File types to search (e.g. ['js', 'ts', 'py'])" },
                    "include_hidden": { "type": "boolean", "description": "Whether to include hidden files (default: false)" }
                },
                "required": ["query"]
            }),
        ),
        def(
            "create_todo_list",
            "Create a new todo list for planning and tracking tasks",
            json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "description": "Array of todo items",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string", "description": "Unique identifier for the todo item" },
                                "content": { "type": "string", "description": "Description of the todo item" },
                                "status": { "type": "string", "enum": ["pending", "in_progress", "completed"], "description": "Current status of the todo item" },
                                "priority": { "type": "string", "enum": ["high", "medium", "low"], "description": "Priority level of the todo item" }
                            },
                            "required": ["id", "content", "status", "priority"]
                        }
                    }
                },
                "required": ["todos"]
            }),
        ),
        def(
            "update_todo_list",
            "Update existing todos in the todo list",
            json!({
                "type": "object",
                "properties": {
                    "updates": {
                        "type": "array",
                        "description": "Array of todo updates",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string", "description": "ID of the todo item to update" },
                                "status": { "type": "string", "enum": ["pending", "in_progress", "completed"], "description": "New status for the todo item" },
                                "content": { "type": "string", "description": "New content for the todo item" },
                                "priority": { "type": "string", "enum": ["high", "medium", "low"], "description": "New priority for the todo item" }
                            },
                            "required": ["id"]
                        }
                    }
                },
                "required": ["updates"]
            }),
        ),
    ]);

    defs
}
