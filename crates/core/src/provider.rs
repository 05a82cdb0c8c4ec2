//! Provider trait, the abstraction over the chat-completions endpoint.
//!
//! A Provider sends a conversation plus tool schemas to a model and returns
//! either a complete response or a channel of raw streaming deltas. Deltas
//! are forwarded unmerged; assembling them is the agent's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, Role};

/// Live-search mode attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Auto,
    On,
    #[default]
    Off,
}

/// Search parameters forwarded verbatim as `search_parameters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchParameters {
    pub mode: SearchMode,
}

impl SearchParameters {
    pub fn new(mode: SearchMode) -> Self {
        Self { mode }
    }
}

/// One chat-completions request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,

    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchParameters>,
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// The `{"type":"function","function":{...}}` wrapper the endpoint expects.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// One candidate in a complete response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: Message,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A complete (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// May be empty; the agent treats that as "No response from model"
    #[serde(default)]
    pub choices: Vec<Choice>,

    #[serde(default)]
    pub usage: Option<Usage>,

    #[serde(default)]
    pub model: String,
}

impl ProviderResponse {
    /// The first choice's message, if the model produced one.
    pub fn first_message(&self) -> Option<&Message> {
        self.choices.first().map(|c| &c.message)
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Partial function fields inside a tool-call delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A fragment of one tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position hint for the call this fragment belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

/// The `delta` object of a streaming chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// One choice inside a streaming chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaChoice {
    #[serde(default)]
    pub index: usize,

    #[serde(default)]
    pub delta: MessageDelta,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A single raw chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<DeltaChoice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// The first choice's delta, if any.
    pub fn first_delta(&self) -> Option<&MessageDelta> {
        self.choices.first().map(|c| &c.delta)
    }

    /// Build a chunk carrying one delta.
    pub fn from_delta(delta: MessageDelta) -> Self {
        Self {
            choices: vec![DeltaChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            usage: None,
        }
    }
}

pub type ChunkReceiver = tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>;

/// The model client seam.
///
/// The agent loop calls `complete()` or `stream()` without knowing which
/// backend answers; tests substitute scripted providers here.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Send a request and get a channel of raw chunks, ending when the
    /// sender is dropped.
    ///
    /// The default replays `complete()` as a single chunk whose tool calls
    /// carry their positions as index hints.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        if let Some(msg) = response.first_message() {
            let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
                msg.tool_calls
                    .iter()
                    .enumerate()
                    .map(|(i, tc)| ToolCallDelta {
                        index: Some(i),
                        id: Some(tc.id.clone()),
                        kind: Some(tc.kind.clone()),
                        function: Some(FunctionDelta {
                            name: Some(tc.function.name.clone()),
                            arguments: Some(tc.function.arguments.clone()),
                        }),
                    })
                    .collect()
            });
            let mut chunk = StreamChunk::from_delta(MessageDelta {
                role: Some(msg.role),
                content: msg.content.clone(),
                tool_calls,
            });
            chunk.usage = response.usage;
            let _ = tx.send(Ok(chunk)).await;
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                choices: vec![Choice {
                    message: Message::assistant_with_tools(
                        Some("checking".into()),
                        vec![ToolCall::new("c1", "bash", r#"{"command":"ls"}"#)],
                    ),
                    finish_reason: Some("tool_calls".into()),
                }],
                usage: None,
                model: "grok-test".into(),
            })
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "grok-test".into(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            temperature: 0.7,
            max_tokens: None,
            search: Some(SearchParameters::new(SearchMode::Off)),
        }
    }

    #[test]
    fn search_mode_serializes_lowercase() {
        let json = serde_json::to_value(SearchParameters::new(SearchMode::Auto)).unwrap();
        assert_eq!(json, serde_json::json!({"mode": "auto"}));
    }

    #[test]
    fn tool_definition_wire_wrapper() {
        let def = ToolDefinition {
            name: "bash".into(),
            description: "Run a command".into(),
            parameters: serde_json::json!({"type": "object"}),
        };
        let wire = def.to_wire();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "bash");
    }

    #[test]
    fn chunk_parses_partial_tool_call() {
        let raw = r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"function":{"arguments":"{\"pa"}}]}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(raw).unwrap();
        let delta = chunk.first_delta().unwrap();
        let calls = delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, Some(1));
        assert!(calls[0].id.is_none());
        assert_eq!(calls[0].function.as_ref().unwrap().arguments.as_deref(), Some("{\"pa"));
    }

    #[test]
    fn response_without_choices_has_no_message() {
        let resp: ProviderResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(resp.first_message().is_none());
    }

    #[tokio::test]
    async fn default_stream_replays_complete_as_one_chunk() {
        let mut rx = FixedProvider.stream(request()).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        let delta = chunk.first_delta().unwrap();
        assert_eq!(delta.content.as_deref(), Some("checking"));
        let calls = delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(calls[0].id.as_deref(), Some("c1"));
        assert!(rx.recv().await.is_none());
    }
}
