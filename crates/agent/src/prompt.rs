//! System prompt assembly.

use std::fmt::Write;
use std::path::PathBuf;

/// Inputs to the system prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub cwd: PathBuf,
    /// Contents of `.quill/QUILL.md`, if present
    pub custom_instructions: Option<String>,
    pub morph_enabled: bool,
    /// Text from `--append-system-prompt`
    pub appended: Option<String>,
}

const INTRO: &str = "You are Quill, an AI assistant for file editing, coding tasks and system \
operations. Always use the available tools for anything that touches files, runs commands, \
searches or plans work. Never simulate tool output or assume a result without calling the tool.";

const RULES: &str = "\
TOOL USAGE RULES:
- Never use create_file on a file that already exists; it overwrites the whole file
- Use str_replace_editor to modify existing files, even for small changes
- View a file with view_file before editing it
- Always format function call arguments as valid JSON

SEARCHING AND EXPLORATION:
- Use search for text content (e.g. \"import.*react\") or file names (e.g. \"component.tsx\")
- Use bash with find, grep, rg or ls for more involved file operations
- view_file is best for reading files you already know exist

TASK PLANNING:
- For requests with several steps, create a todo list first
- Mark one item in_progress at a time and mark items completed as soon as they finish
- Give every item a priority: high, medium or low

RESPONSE GUIDELINES:
- Be direct and concise; explain what you are doing and show results
- Do not open with pleasantries after using tools
- When a tool call completes the request, a brief confirmation is enough";

/// Build the system prompt sent as the first message of every conversation.
pub fn build_system_prompt(ctx: &PromptContext) -> String {
    let mut prompt = String::from(INTRO);

    if let Some(custom) = ctx.custom_instructions.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = write!(
            prompt,
            "\n\nCUSTOM INSTRUCTIONS:\n{}\n\nFollow the custom instructions above alongside the standard instructions below.",
            custom.trim()
        );
    }

    prompt.push_str("\n\nYou have access to these tools:\n");
    prompt.push_str("- view_file: View file contents or directory listings\n");
    prompt.push_str("- create_file: Create a new file with content (only for files that do not exist yet)\n");
    prompt.push_str("- str_replace_editor: Replace text in an existing file\n");
    if ctx.morph_enabled {
        prompt.push_str("- edit_file: Fast whole-file edits with Morph Fast Apply\n");
    }
    prompt.push_str("- bash: Execute shell commands\n");
    prompt.push_str("- search: Find text content or files by name\n");
    prompt.push_str("- create_todo_list: Create a todo list for planning\n");
    prompt.push_str("- update_todo_list: Update items in the todo list\n\n");
    prompt.push_str(RULES);

    let _ = write!(prompt, "\n\nCurrent working directory: {}", ctx.cwd.display());

    if let Some(extra) = ctx.appended.as_deref().filter(|s| !s.is_empty()) {
        let _ = write!(prompt, "\n\n{extra}");
    }
    prompt
}
