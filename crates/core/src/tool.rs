//! The tool result envelope and the plugin tool seam.
//!
//! Built-in tools are a closed set dispatched by the agent crate. Tools that
//! are registered at runtime (external plugin servers) implement [`Tool`] and
//! live in a [`ToolRegistry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The uniform `{success, output?, error?}` envelope every tool returns.
///
/// Fields are private so the invariant holds everywhere: a success never
/// carries an error, and a failure always carries a non-empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawToolResult")]
pub struct ToolResult {
    success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Unchecked wire form, validated into a [`ToolResult`] on deserialize.
#[derive(Deserialize)]
struct RawToolResult {
    success: bool,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl TryFrom<RawToolResult> for ToolResult {
    type Error = String;

    fn try_from(raw: RawToolResult) -> Result<Self, Self::Error> {
        match (raw.success, raw.error) {
            (true, Some(_)) => Err("a successful tool result cannot carry an error".into()),
            (true, None) => Ok(Self {
                success: true,
                output: raw.output,
                error: None,
            }),
            (false, Some(error)) if !error.trim().is_empty() => Ok(Self {
                success: false,
                output: raw.output,
                error: Some(error),
            }),
            (false, _) => Err("a failed tool result needs a non-empty error".into()),
        }
    }
}

impl ToolResult {
    /// A successful result with output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// A successful result with nothing to report.
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            output: None,
            error: None,
        }
    }

    /// A failed result. An empty message is replaced so the error is never blank.
    pub fn fail(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            error
        };
        Self {
            success: false,
            output: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Text shown to the user and fed back to the model.
    pub fn entry_text(&self) -> String {
        if self.success {
            match self.output.as_deref() {
                Some(out) if !out.is_empty() => out.to_string(),
                _ => "Success".to_string(),
            }
        } else {
            self.error.clone().unwrap_or_else(|| "Error occurred".to_string())
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        Self::fail(err.to_string())
    }
}

/// A runtime-registered tool (e.g. one exposed by an external plugin server).
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool, returning its text output.
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Name-keyed registry of runtime tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Definitions sorted by name so the schema sent to the model is stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "mcp__echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
            Ok(arguments["text"].as_str().unwrap_or("").to_string())
        }
    }

    #[test]
    fn ok_never_carries_error() {
        let r = ToolResult::ok("done");
        assert!(r.is_success());
        assert_eq!(r.output(), Some("done"));
        assert!(r.error().is_none());
        assert!(ToolResult::ok_empty().error().is_none());
    }

    #[test]
    fn fail_always_carries_non_empty_error() {
        for msg in ["boom", "", "   "] {
            let r = ToolResult::fail(msg);
            assert!(!r.is_success());
            assert!(r.output().is_none());
            assert!(!r.error().unwrap().trim().is_empty());
        }
    }

    #[test]
    fn entry_text_fallbacks() {
        assert_eq!(ToolResult::ok_empty().entry_text(), "Success");
        assert_eq!(ToolResult::ok("").entry_text(), "Success");
        assert_eq!(ToolResult::ok("out").entry_text(), "out");
        assert_eq!(ToolResult::fail("bad").entry_text(), "bad");
    }

    #[test]
    fn envelope_serialization_omits_absent_fields() {
        let json = serde_json::to_value(ToolResult::fail("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "nope"}));
    }

    #[test]
    fn deserialize_enforces_the_envelope() {
        let ok: ToolResult = serde_json::from_str(r#"{"success":true,"output":"x"}"#).unwrap();
        assert_eq!(ok, ToolResult::ok("x"));
        let failed: ToolResult = serde_json::from_str(r#"{"success":false,"error":"bad"}"#).unwrap();
        assert_eq!(failed, ToolResult::fail("bad"));

        for json in [
            r#"{"success":false}"#,
            r#"{"success":false,"error":"  "}"#,
            r#"{"success":true,"error":"bad"}"#,
        ] {
            assert!(serde_json::from_str::<ToolResult>(json).is_err(), "{json}");
        }
    }

    #[test]
    fn tool_error_converts_to_failure() {
        let r: ToolResult = ToolError::InvalidArguments("missing path".into()).into();
        assert!(!r.is_success());
        assert!(r.error().unwrap().contains("missing path"));
    }

    #[test]
    fn registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "mcp__echo");
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let out = registry
            .execute("mcp__echo", serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("mcp__nothing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
