//! The UI-facing chat log.
//!
//! A `ChatEntry` is what a front end renders. Tool-call entries are created
//! as "Executing..." and later resolved in place into tool-result entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::ToolCall;
use crate::tool::ToolResult;

pub const EXECUTING: &str = "Executing...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEntryKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    #[serde(rename = "type")]
    pub kind: ChatEntryKind,

    pub content: String,

    pub timestamp: DateTime<Utc>,

    /// Calls requested by an assistant entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// The single call a tool_call / tool_result entry is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl ChatEntry {
    fn new(kind: ChatEntryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_call: None,
            tool_result: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatEntryKind::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatEntryKind::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut entry = Self::new(ChatEntryKind::Assistant, content);
        entry.tool_calls = tool_calls;
        entry
    }

    /// A pending tool-call entry.
    pub fn tool_call(call: ToolCall) -> Self {
        let mut entry = Self::new(ChatEntryKind::ToolCall, EXECUTING);
        entry.tool_call = Some(call);
        entry
    }

    /// Turn a pending tool-call entry into its tool-result entry. Any other
    /// entry is left untouched.
    pub fn resolve(&mut self, result: ToolResult) {
        if self.kind != ChatEntryKind::ToolCall {
            return;
        }
        self.kind = ChatEntryKind::ToolResult;
        self.content = result.entry_text();
        self.tool_result = Some(result);
    }

    pub fn is_pending_tool_call(&self) -> bool {
        self.kind == ChatEntryKind::ToolCall
    }

    /// Id of the call this entry is about, if any.
    pub fn call_id(&self) -> Option<&str> {
        self.tool_call.as_ref().map(|c| c.id.as_str())
    }
}
