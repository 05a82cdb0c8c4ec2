//! Scripted providers and response builders shared by the loop tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::error::ProviderError;
use quill_core::message::{Message, ToolCall};
use quill_core::provider::{
    ChunkReceiver, Choice, FunctionDelta, MessageDelta, Provider, ProviderRequest,
    ProviderResponse, StreamChunk, ToolCallDelta, Usage,
};

/// Returns scripted responses in order, recording every request.
///
/// With `repeat_last`, the final response is returned forever; otherwise
/// running out of responses panics.
pub struct SequentialMockProvider {
    responses: Vec<Result<ProviderResponse, ProviderError>>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: responses.into_iter().map(Ok).collect(),
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            responses: vec![Err(error)],
            repeat_last: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let n = requests.len();
        requests.push(request);

        let idx = if self.repeat_last {
            n.min(self.responses.len() - 1)
        } else {
            n
        };
        match self.responses.get(idx) {
            Some(r) => r.clone(),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{n}, have {})",
                self.responses.len()
            ),
        }
    }
}

/// Streams scripted chunk lists, one list per model call.
///
/// `hang` keeps the channel open after the last chunk of the final call
/// until the receiver goes away, which is how a stalled server looks.
pub struct ScriptedStreamProvider {
    rounds: Mutex<Vec<Vec<StreamChunk>>>,
    hang: bool,
    delay: Duration,
}

impl ScriptedStreamProvider {
    pub fn new(rounds: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            rounds: Mutex::new(rounds),
            hang: false,
            delay: Duration::ZERO,
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Provider for ScriptedStreamProvider {
    fn name(&self) -> &str {
        "scripted_stream"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::InvalidResponse("streaming only".into()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (chunks, last) = {
            let mut rounds = self.rounds.lock().unwrap();
            assert!(!rounds.is_empty(), "ScriptedStreamProvider: no more rounds");
            let chunks = rounds.remove(0);
            (chunks, rounds.is_empty())
        };
        let hang = self.hang && last;
        let delay = self.delay;
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            for chunk in chunks {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if hang {
                tx.closed().await;
            }
        });
        Ok(rx)
    }
}

fn response(message: Message) -> ProviderResponse {
    ProviderResponse {
        choices: vec![Choice {
            message,
            finish_reason: Some("stop".into()),
        }],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A final answer with no tool calls.
pub fn make_text_response(text: &str) -> ProviderResponse {
    response(Message::assistant(text))
}

/// A response asking for `tool_calls`, with optional leading text.
pub fn make_tool_call_response(tool_calls: Vec<ToolCall>, thought: &str) -> ProviderResponse {
    let content = (!thought.is_empty()).then(|| thought.to_string());
    response(Message::assistant_with_tools(content, tool_calls))
}

pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, args.to_string())
}

pub fn content_chunk(text: &str) -> StreamChunk {
    StreamChunk::from_delta(MessageDelta {
        content: Some(text.into()),
        ..MessageDelta::default()
    })
}

/// A chunk carrying one fragment of the call at `index`.
pub fn tool_call_chunk(
    index: usize,
    id: Option<&str>,
    name: Option<&str>,
    arguments: &str,
) -> StreamChunk {
    StreamChunk::from_delta(MessageDelta {
        tool_calls: Some(vec![ToolCallDelta {
            index: Some(index),
            id: id.map(Into::into),
            kind: id.map(|_| "function".into()),
            function: Some(FunctionDelta {
                name: name.map(Into::into),
                arguments: Some(arguments.into()),
            }),
        }]),
        ..MessageDelta::default()
    })
}
