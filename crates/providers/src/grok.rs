//! Grok / OpenAI-compatible chat-completions client.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling with `tool_choice: "auto"`
//! - xAI live-search `search_parameters`
//!
//! Streaming forwards each parsed `data:` chunk unmodified; merging the
//! deltas into a message happens in the agent.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use quill_core::error::ProviderError;
use quill_core::provider::*;
use tracing::{debug, trace, warn};

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct GrokClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GrokClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        body: &serde_json::Value,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut req = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body);
        if streaming {
            req = req.header("Accept", "text/event-stream");
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model endpoint returned error");
            return Err(map_status(status, error_body));
        }
        Ok(response)
    }
}

/// Build the JSON request body.
pub fn build_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": request.messages,
        "temperature": request.temperature,
        "stream": stream,
    });

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }

    if !request.tools.is_empty() {
        let tools: Vec<_> = request.tools.iter().map(ToolDefinition::to_wire).collect();
        body["tools"] = serde_json::Value::Array(tools);
        body["tool_choice"] = serde_json::json!("auto");
    }

    if let Some(search) = request.search {
        body["search_parameters"] = serde_json::json!(search);
    }

    body
}

/// Map a non-2xx status to a provider error.
pub fn map_status(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// One parsed SSE event.
#[derive(Debug)]
pub enum SseEvent {
    Chunk(StreamChunk),
    Done,
}

/// Line buffer for a `text/event-stream` body. Bytes may split lines
/// anywhere; only complete lines are parsed.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        // Decode whole lines only, so a character split across reads stays intact
        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = parse_line(line.trim_end_matches(['\n', '\r'])) {
                let done = matches!(event, SseEvent::Done);
                events.push(event);
                if done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    // Blank lines and `:` comments carry nothing
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => Some(SseEvent::Chunk(chunk)),
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            None
        }
    }
}

#[async_trait]
impl Provider for GrokClient {
    fn name(&self) -> &str {
        "grok"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending completion request");

        let response = self.send(&build_body(&request, false), false).await?;
        response
            .json::<ProviderResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending streaming request");

        let response = self.send(&build_body(&request, true), true).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut parser = SseParser::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for event in parser.push(&bytes) {
                    match event {
                        SseEvent::Chunk(chunk) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                // receiver dropped
                                return;
                            }
                        }
                        SseEvent::Done => return,
                    }
                }
            }
            trace!("SSE body ended without [DONE]");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::message::{Message, ToolCall};

    fn request(tools: Vec<ToolDefinition>) -> ProviderRequest {
        ProviderRequest {
            model: "grok-code-fast-1".into(),
            messages: vec![Message::system("You are helpful"), Message::user("Hello")],
            tools,
            temperature: 0.7,
            max_tokens: Some(1024),
            search: Some(SearchParameters::new(SearchMode::Off)),
        }
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = GrokClient::new("https://api.x.ai/v1/", "k", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://api.x.ai/v1");
        assert_eq!(client.endpoint(), "https://api.x.ai/v1/chat/completions");
    }

    #[test]
    fn body_without_tools_has_no_tool_choice() {
        let body = build_body(&request(vec![]), false);
        assert_eq!(body["model"], "grok-code-fast-1");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["search_parameters"]["mode"], "off");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn body_with_tools() {
        let tools = vec![ToolDefinition {
            name: "bash".into(),
            description: "Run a shell command".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = build_body(&request(tools), true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "bash");
    }

    #[test]
    fn body_keeps_tool_linkage_fields() {
        let mut req = request(vec![]);
        req.messages.push(Message::assistant_with_tools(
            None,
            vec![ToolCall::new("call_1", "bash", "{}")],
        ));
        req.messages.push(Message::tool_result("call_1", "ok"));
        let body = build_body(&req, false);
        assert!(body["messages"][2]["content"].is_null());
        assert_eq!(body["messages"][2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(map_status(429, String::new()), ProviderError::RateLimited { .. }));
        assert!(matches!(map_status(401, String::new()), ProviderError::AuthenticationFailed(_)));
        assert!(matches!(map_status(403, String::new()), ProviderError::AuthenticationFailed(_)));
        match map_status(500, "boom".into()) {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    // --- SSE parsing tests ---

    #[test]
    fn sse_parses_content_chunks() {
        let mut parser = SseParser::new();
        let events = parser.push(
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n\
              data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        );
        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SseEvent::Chunk(c) => c.first_delta().and_then(|d| d.content.clone()),
                SseEvent::Done => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[test]
    fn sse_handles_lines_split_across_reads() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let events = parser.push(b"tent\":\"x\"}}]}\r\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SseEvent::Chunk(c) if c.first_delta().unwrap().content.as_deref() == Some("x")));
    }

    #[test]
    fn sse_keeps_multibyte_characters_split_across_reads() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        // Split between the two bytes of 'é' (0xC3 0xA9)
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut parser = SseParser::new();
        assert!(parser.push(&line[..split]).is_empty());
        let events = parser.push(&line[split..]);
        assert_eq!(events.len(), 1);
        let SseEvent::Chunk(chunk) = &events[0] else {
            panic!("expected a chunk, got {:?}", events[0]);
        };
        assert_eq!(chunk.first_delta().unwrap().content.as_deref(), Some("café"));
    }

    #[test]
    fn sse_skips_comments_and_garbage() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\n\ndata: not json\nevent: ping\n");
        assert!(events.is_empty());
    }

    #[test]
    fn sse_stops_at_done() {
        let mut parser = SseParser::new();
        let events = parser.push(
            b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SseEvent::Done));
    }

    #[test]
    fn sse_forwards_tool_call_fragments_raw() {
        let mut parser = SseParser::new();
        let events = parser.push(
            b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"bash\",\"arguments\":\"\"}}]}}]}\n",
        );
        let SseEvent::Chunk(chunk) = &events[0] else {
            panic!("expected chunk");
        };
        let calls = chunk.first_delta().unwrap().tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].function.as_ref().unwrap().name.as_deref(), Some("bash"));
    }
}
