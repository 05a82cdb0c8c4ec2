//! Chunks yielded by the streaming agent loop.
//!
//! Serialized one per line by `--output-format stream-json`, so the tag
//! names are part of the CLI's output contract.

use quill_core::message::ToolCall;
use quill_core::tool::ToolResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamingChunk {
    /// Running estimate of input plus output tokens.
    TokenCount { token_count: usize },

    /// Text to show the user as it arrives.
    Content { content: String },

    /// The calls the model asked for this round.
    ToolCalls { tool_calls: Vec<ToolCall> },

    /// One call has finished.
    ToolResult {
        tool_call: ToolCall,
        tool_result: ToolResult,
    },

    /// Always the last chunk of a run.
    Done,
}

impl StreamingChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            content: text.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_content() {
        let json = serde_json::to_string(&StreamingChunk::content("Hello")).unwrap();
        assert!(json.contains(r#""type":"content""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn serialization_token_count() {
        let json = serde_json::to_string(&StreamingChunk::TokenCount { token_count: 42 }).unwrap();
        assert_eq!(json, r#"{"type":"token_count","token_count":42}"#);
    }

    #[test]
    fn serialization_tool_result() {
        let chunk = StreamingChunk::ToolResult {
            tool_call: ToolCall::new("call_1", "bash", r#"{"command":"ls"}"#),
            tool_result: ToolResult::fail("Command failed (exit code 1): nope"),
        };
        let json: serde_json::Value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_call"]["function"]["name"], "bash");
        assert_eq!(json["tool_result"]["success"], false);
    }

    #[test]
    fn serialization_done() {
        let json = serde_json::to_string(&StreamingChunk::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
        assert!(StreamingChunk::Done.is_done());
    }
}
