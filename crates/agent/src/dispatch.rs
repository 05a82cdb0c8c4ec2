//! Routes model tool calls to the built-in tools or to runtime plugins.
//!
//! Dispatch never fails: every problem, from malformed arguments to an
//! unknown tool name, comes back as a failed [`ToolResult`] so the model
//! can see it and recover.

use std::path::{Path, PathBuf};

use quill_core::message::ToolCall;
use quill_core::provider::ToolDefinition;
use quill_core::tool::{Tool, ToolRegistry, ToolResult};
use quill_tools::schema::{
    BashArgs, CreateFileArgs, CreateTodoListArgs, EditFileArgs, SearchArgs, StrReplaceArgs,
    UpdateTodoListArgs, ViewFileArgs,
};
use quill_tools::{
    BashTool, MorphEditorTool, SearchTool, TextEditorTool, TodoTool, builtin_definitions,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Names starting with this prefix belong to plugin tools.
pub const PLUGIN_PREFIX: &str = "mcp__";

pub const MORPH_UNAVAILABLE: &str = "Morph Fast Apply not available. Please set MORPH_API_KEY environment variable to use this feature.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    ViewFile,
    CreateFile,
    StrReplaceEditor,
    EditFile,
    Bash,
    Search,
    CreateTodoList,
    UpdateTodoList,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 8] = [
        Self::ViewFile,
        Self::CreateFile,
        Self::StrReplaceEditor,
        Self::EditFile,
        Self::Bash,
        Self::Search,
        Self::CreateTodoList,
        Self::UpdateTodoList,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ViewFile => "view_file",
            Self::CreateFile => "create_file",
            Self::StrReplaceEditor => "str_replace_editor",
            Self::EditFile => "edit_file",
            Self::Bash => "bash",
            Self::Search => "search",
            Self::CreateTodoList => "create_todo_list",
            Self::UpdateTodoList => "update_todo_list",
        }
    }
}

/// Where a call named `name` goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolTarget {
    Builtin(BuiltinTool),
    Plugin,
    Unknown,
}

impl ToolTarget {
    pub fn resolve(name: &str) -> Self {
        if let Some(tool) = BuiltinTool::from_name(name) {
            Self::Builtin(tool)
        } else if name.starts_with(PLUGIN_PREFIX) {
            Self::Plugin
        } else {
            Self::Unknown
        }
    }
}

fn execution_error(e: impl std::fmt::Display) -> ToolResult {
    ToolResult::fail(format!("Tool execution error: {e}"))
}

fn parse_args<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ToolResult> {
    serde_json::from_value(value).map_err(execution_error)
}

/// Owns one instance of every built-in tool plus the plugin registry.
pub struct ToolDispatcher {
    text_editor: TextEditorTool,
    morph: Option<MorphEditorTool>,
    bash: BashTool,
    search: SearchTool,
    todo: TodoTool,
    plugins: ToolRegistry,
}

impl ToolDispatcher {
    /// Build the tools for `cwd`. `edit_file` is enabled only when a
    /// non-empty Morph key is given.
    pub fn new(cwd: impl Into<PathBuf>, morph_api_key: Option<&str>) -> Self {
        let cwd = cwd.into();
        Self {
            text_editor: TextEditorTool::new(&cwd),
            morph: morph_api_key
                .filter(|key| !key.trim().is_empty())
                .and_then(|key| MorphEditorTool::new(&cwd, key)),
            bash: BashTool::new(&cwd),
            search: SearchTool::new(&cwd),
            todo: TodoTool::new(),
            plugins: ToolRegistry::new(),
        }
    }

    /// Register a plugin tool. Its name should carry the `mcp__` prefix to
    /// be reachable.
    pub fn register_plugin(&mut self, tool: Box<dyn Tool>) {
        if !tool.name().starts_with(PLUGIN_PREFIX) {
            warn!(tool = tool.name(), "Plugin tool name lacks the {PLUGIN_PREFIX} prefix and will not be dispatched");
        }
        self.plugins.register(tool);
    }

    pub fn morph_enabled(&self) -> bool {
        self.morph.is_some()
    }

    pub fn current_directory(&self) -> &Path {
        self.bash.current_directory()
    }

    pub fn bash(&self) -> &BashTool {
        &self.bash
    }

    pub fn todo(&self) -> &TodoTool {
        &self.todo
    }

    /// Built-in schemas first, then plugin schemas.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = builtin_definitions(self.morph_enabled());
        defs.extend(self.plugins.definitions());
        defs
    }

    /// Run one call to completion.
    pub async fn dispatch(&mut self, call: &ToolCall) -> ToolResult {
        let name = call.name();
        let args: serde_json::Value = match serde_json::from_str(&call.function.arguments) {
            Ok(v) => v,
            Err(e) => {
                debug!(tool = %name, error = %e, "Tool arguments are not valid JSON");
                return execution_error(e);
            }
        };

        let result = match ToolTarget::resolve(name) {
            ToolTarget::Builtin(tool) => self.run_builtin(tool, args).await,
            ToolTarget::Plugin => self.run_plugin(name, args).await,
            ToolTarget::Unknown => ToolResult::fail(format!("Unknown tool: {name}")),
        };
        debug!(tool = %name, success = result.is_success(), "Tool dispatched");
        result
    }

    async fn run_builtin(&mut self, tool: BuiltinTool, args: serde_json::Value) -> ToolResult {
        match self.try_builtin(tool, args).await {
            Ok(result) | Err(result) => result,
        }
    }

    async fn try_builtin(
        &mut self,
        tool: BuiltinTool,
        args: serde_json::Value,
    ) -> Result<ToolResult, ToolResult> {
        let result = match tool {
            BuiltinTool::ViewFile => {
                let a: ViewFileArgs = parse_args(args)?;
                self.text_editor.view(&a.path, a.range()).await
            }
            BuiltinTool::CreateFile => {
                let a: CreateFileArgs = parse_args(args)?;
                self.text_editor.create(&a.path, &a.content).await
            }
            BuiltinTool::StrReplaceEditor => {
                let a: StrReplaceArgs = parse_args(args)?;
                self.text_editor
                    .str_replace(&a.path, &a.old_str, &a.new_str, a.replace_all)
                    .await
            }
            BuiltinTool::EditFile => {
                let Some(morph) = &self.morph else {
                    return Err(ToolResult::fail(MORPH_UNAVAILABLE));
                };
                let a: EditFileArgs = parse_args(args)?;
                morph
                    .edit_file(&a.target_file, &a.instructions, &a.code_edit)
                    .await
            }
            BuiltinTool::Bash => {
                let a: BashArgs = parse_args(args)?;
                self.bash.execute(&a.command).await
            }
            BuiltinTool::Search => {
                let a: SearchArgs = parse_args(args)?;
                self.search.search(&a.query, a.options).await
            }
            BuiltinTool::CreateTodoList => {
                let a: CreateTodoListArgs = parse_args(args)?;
                self.todo.create_todo_list(a.todos)
            }
            BuiltinTool::UpdateTodoList => {
                let a: UpdateTodoListArgs = parse_args(args)?;
                self.todo.update_todo_list(a.updates)
            }
        };
        Ok(result)
    }

    async fn run_plugin(&self, name: &str, args: serde_json::Value) -> ToolResult {
        match self.plugins.execute(name, args).await {
            Ok(output) if output.is_empty() => ToolResult::ok("Success"),
            Ok(output) => ToolResult::ok(output),
            Err(e) => {
                warn!(tool = %name, error = %e, "Plugin tool failed");
                ToolResult::fail(format!("MCP tool execution error: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_core::error::ToolError;
    use serde_json::json;

    struct PluginTool {
        name: &'static str,
        reply: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl Tool for PluginTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test plugin"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
            self.reply.map(str::to_string).map_err(|reason| ToolError::ExecutionFailed {
                tool_name: self.name.into(),
                reason: reason.into(),
            })
        }
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new("call_1", name, args.to_string())
    }

    #[test]
    fn builtin_names_round_trip() {
        for tool in BuiltinTool::ALL {
            assert_eq!(BuiltinTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(ToolTarget::resolve("bash"), ToolTarget::Builtin(BuiltinTool::Bash));
        assert_eq!(ToolTarget::resolve("mcp__github__issues"), ToolTarget::Plugin);
        assert_eq!(ToolTarget::resolve("frobnicate"), ToolTarget::Unknown);
    }

    #[tokio::test]
    async fn unknown_tool_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);
        let result = d.dispatch(&call("frobnicate", json!({}))).await;
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Unknown tool: frobnicate"));
    }

    #[tokio::test]
    async fn malformed_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);
        let result = d.dispatch(&ToolCall::new("c", "bash", "{bad json")).await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().starts_with("Tool execution error: "));
    }

    #[tokio::test]
    async fn wrong_argument_shape_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);
        let result = d.dispatch(&call("view_file", json!({"file": "x"}))).await;
        assert!(result.error().unwrap().starts_with("Tool execution error: "));
        assert!(result.error().unwrap().contains("path"));
    }

    #[tokio::test]
    async fn edit_file_without_morph() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);
        assert!(!d.morph_enabled());
        let result = d
            .dispatch(&call(
                "edit_file",
                json!({"target_file": "a.rs", "instructions": "I add a fn", "code_edit": "fn a() {}"}),
            ))
            .await;
        assert_eq!(result.error(), Some(MORPH_UNAVAILABLE));
    }

    #[tokio::test]
    async fn file_tools_share_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);

        let created = d
            .dispatch(&call("create_file", json!({"path": "notes/a.txt", "content": "one\ntwo"})))
            .await;
        assert!(created.is_success(), "{created:?}");
        assert!(dir.path().join("notes/a.txt").exists());

        let replaced = d
            .dispatch(&call(
                "str_replace_editor",
                json!({"path": "notes/a.txt", "old_str": "two", "new_str": "three"}),
            ))
            .await;
        assert!(replaced.is_success(), "{replaced:?}");

        let viewed = d.dispatch(&call("view_file", json!({"path": "notes/a.txt"}))).await;
        assert!(viewed.output().unwrap().contains("2: three"));
    }

    #[tokio::test]
    async fn bash_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);
        let result = d.dispatch(&call("bash", json!({"command": "ls"}))).await;
        assert!(result.output().unwrap().contains("marker.txt"));
    }

    #[tokio::test]
    async fn todo_lists_persist_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);
        d.dispatch(&call(
            "create_todo_list",
            json!({"todos": [{"id": "1", "content": "Write tests", "status": "pending", "priority": "high"}]}),
        ))
        .await;
        let result = d
            .dispatch(&call("update_todo_list", json!({"updates": [{"id": "1", "status": "completed"}]})))
            .await;
        assert!(result.output().unwrap().contains("● Write tests"));
        assert_eq!(d.todo().items().len(), 1);
    }

    #[tokio::test]
    async fn plugin_calls_go_through_the_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);
        d.register_plugin(Box::new(PluginTool { name: "mcp__echo", reply: Ok("pong") }));
        d.register_plugin(Box::new(PluginTool { name: "mcp__quiet", reply: Ok("") }));
        d.register_plugin(Box::new(PluginTool { name: "mcp__broken", reply: Err("server gone") }));

        let ok = d.dispatch(&call("mcp__echo", json!({}))).await;
        assert_eq!(ok.output(), Some("pong"));

        let quiet = d.dispatch(&call("mcp__quiet", json!({}))).await;
        assert_eq!(quiet.output(), Some("Success"));

        let broken = d.dispatch(&call("mcp__broken", json!({}))).await;
        assert!(broken.error().unwrap().starts_with("MCP tool execution error: "));
        assert!(broken.error().unwrap().contains("server gone"));

        let missing = d.dispatch(&call("mcp__absent", json!({}))).await;
        assert!(missing.error().unwrap().starts_with("MCP tool execution error: "));
    }

    #[test]
    fn definitions_list_builtins_then_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = ToolDispatcher::new(dir.path(), None);
        d.register_plugin(Box::new(PluginTool { name: "mcp__echo", reply: Ok("") }));
        let names: Vec<_> = d.definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 8);
        assert_eq!(names[0], "view_file");
        assert!(!names.contains(&"edit_file".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("mcp__echo"));

        let with_morph = ToolDispatcher::new(dir.path(), Some("key"));
        assert!(with_morph.morph_enabled());
        assert!(with_morph.definitions().iter().any(|t| t.name == "edit_file"));
    }
}
