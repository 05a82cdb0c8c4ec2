//! The agent loop: call the model, run the tools it asks for, feed the
//! results back, and repeat until it answers in plain text or a bound is
//! reached.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::Stream;
use quill_config::{AppConfig, load_custom_instructions};
use quill_core::chat::{ChatEntry, ChatEntryKind};
use quill_core::error::ProviderError;
use quill_core::message::{Conversation, Message, ToolCall};
use quill_core::provider::{Provider, ProviderRequest, SearchParameters, ToolDefinition};
use quill_core::tool::{Tool, ToolResult};
use quill_telemetry::{AgentOutput, TelemetryEngine};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delta::PartialMessage;
use crate::dispatch::ToolDispatcher;
use crate::prompt::{PromptContext, build_system_prompt};
use crate::search_mode::search_mode_for;
use crate::stream_event::StreamingChunk;
use crate::token::{estimate_input_tokens, estimate_tokens};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 400;
pub const DEFAULT_MAX_TURNS: usize = 500;

pub const USING_TOOLS: &str = "Using tools to help you...";
pub const NO_SPECIFIC_RESPONSE: &str = "I understand, but I don't have a specific response.";
pub const MAX_ROUNDS_WARNING: &str =
    "Maximum tool execution rounds reached. Stopping to prevent infinite loops.";
pub const CANCELLED_NOTICE: &str = "\n\n[Operation cancelled by user]";

/// Minimum spacing between `token_count` chunks while content streams.
const TOKEN_COUNT_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
enum TurnError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("No response from model")]
    NoResponse,
}

/// Counters for the most recent `process_user_message*` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Model responses that carried tool calls
    pub tool_rounds: usize,
    /// Model calls made
    pub turns: usize,
}

/// Cancels whatever streaming call is in flight.
///
/// Cloneable and detached from the agent, so it can be held while the
/// agent is mutably borrowed by a stream.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl AbortHandle {
    /// Cancel the live operation. Returns false when nothing was running.
    pub fn abort(&self) -> bool {
        let slot = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Install a fresh token, replacing any previous one.
    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        token
    }
}

/// Ends the telemetry session when dropped, so an abandoned stream still
/// closes its trace.
struct SessionGuard {
    telemetry: Arc<TelemetryEngine>,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.telemetry.end_session(&self.id);
    }
}

/// The agent.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_tool_rounds: usize,
    max_turns: usize,
    conversation: Conversation,
    history: Vec<ChatEntry>,
    dispatcher: ToolDispatcher,
    telemetry: Arc<TelemetryEngine>,
    abort: AbortHandle,
    last_run: RunStats,
}

impl AgentLoop {
    /// Create an agent whose conversation starts with `system_prompt`.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        dispatcher: ToolDispatcher,
        system_prompt: impl Into<String>,
    ) -> Self {
        let mut conversation = Conversation::new();
        conversation.push(Message::system(system_prompt));
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_turns: DEFAULT_MAX_TURNS,
            conversation,
            history: Vec::new(),
            dispatcher,
            telemetry: Arc::new(TelemetryEngine::disabled()),
            abort: AbortHandle::default(),
            last_run: RunStats::default(),
        }
    }

    /// Build the tools, system prompt and limits from loaded settings.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        config: &AppConfig,
        cwd: impl Into<PathBuf>,
        appended_prompt: Option<String>,
    ) -> Self {
        let cwd = cwd.into();
        let dispatcher = ToolDispatcher::new(&cwd, config.morph_api_key.as_deref());
        let prompt = build_system_prompt(&PromptContext {
            custom_instructions: load_custom_instructions(&cwd),
            morph_enabled: dispatcher.morph_enabled(),
            appended: appended_prompt,
            cwd,
        });
        Self::new(provider, &config.model, dispatcher, prompt)
            .with_temperature(config.temperature)
            .with_max_tokens(Some(config.max_tokens))
            .with_max_tool_rounds(config.max_tool_rounds)
            .with_max_turns(config.max_turns)
            .with_telemetry(Arc::new(TelemetryEngine::new(config.telemetry.clone())))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = turns;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryEngine>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Add a runtime plugin tool (name prefixed `mcp__`).
    pub fn register_plugin(&mut self, tool: Box<dyn Tool>) {
        self.dispatcher.register_plugin(tool);
    }

    pub fn chat_history(&self) -> &[ChatEntry] {
        &self.history
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn last_run(&self) -> RunStats {
        self.last_run
    }

    pub fn current_model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
        info!(model = %self.model, "Model changed");
    }

    pub fn current_directory(&self) -> &Path {
        self.dispatcher.current_directory()
    }

    pub fn telemetry(&self) -> &Arc<TelemetryEngine> {
        &self.telemetry
    }

    /// Run a shell command in the agent's working directory, outside the
    /// conversation.
    pub async fn execute_bash_command(&self, command: &str) -> ToolResult {
        self.dispatcher.bash().execute(command).await
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Cancel the in-flight streaming call, if any.
    pub fn abort_current_operation(&self) -> bool {
        self.abort.abort()
    }

    /// Process one user message to completion and return the chat entries
    /// it produced, starting with the user's own.
    ///
    /// A failed model call ends the run with a single apology entry; the
    /// return value is then just the user entry and that entry.
    pub async fn process_user_message(&mut self, message: &str) -> Vec<ChatEntry> {
        let started = Instant::now();
        let start = self.history.len();
        self.begin_run(message);
        let session = self.open_session();
        info!(model = %self.model, messages = self.conversation.len(), "Processing user message");

        let search = SearchParameters::new(search_mode_for(&self.model, message));
        let tools = self.dispatcher.definitions();

        let outcome = self.run_rounds(&tools, search).await;
        let entries = match outcome {
            Ok(()) => self.history[start..].to_vec(),
            Err(e) => {
                warn!(error = %e, "Model call failed");
                let entry = ChatEntry::assistant(format!("Sorry, I encountered an error: {e}"));
                self.history.push(entry.clone());
                vec![self.history[start].clone(), entry]
            }
        };

        self.track_output(&session, start, started);
        info!(
            tool_rounds = self.last_run.tool_rounds,
            turns = self.last_run.turns,
            "User message processed"
        );
        entries
    }

    async fn run_rounds(
        &mut self,
        tools: &[ToolDefinition],
        search: SearchParameters,
    ) -> Result<(), TurnError> {
        loop {
            self.last_run.turns += 1;
            debug!(turn = self.last_run.turns, "Calling model");
            let response = self.provider.complete(self.request(tools, search)).await?;
            let message = response.first_message().cloned().ok_or(TurnError::NoResponse)?;

            if message.tool_calls.is_empty() {
                self.record_answer(message.content);
                return Ok(());
            }

            self.last_run.tool_rounds += 1;
            let calls = message.tool_calls;
            let first = self.record_tool_request(message.content, &calls);
            for (i, call) in calls.iter().enumerate() {
                let result = self.dispatcher.dispatch(call).await;
                self.record_tool_result(first + i, call, result);
            }

            if self.push_bound_warnings().is_some() {
                return Ok(());
            }
        }
    }

    /// Streaming counterpart of [`process_user_message`](Self::process_user_message).
    ///
    /// The returned stream always ends with exactly one `Done` chunk, and
    /// can be cancelled through [`abort_handle`](Self::abort_handle).
    pub fn process_user_message_stream(
        &mut self,
        message: String,
    ) -> impl Stream<Item = StreamingChunk> + '_ {
        let token = self.abort.arm();
        let this = self;

        stream! {
            let started = Instant::now();
            let start = this.history.len();
            this.begin_run(&message);
            let session = this.open_session();
            info!(model = %this.model, "Processing user message (streaming)");

            let search = SearchParameters::new(search_mode_for(&this.model, &message));
            let tools = this.dispatcher.definitions();
            let mut input_tokens = estimate_input_tokens(&this.conversation);
            yield StreamingChunk::TokenCount { token_count: input_tokens };

            let mut cancelled = false;
            let mut failure: Option<TurnError> = None;
            let mut last_count: Option<tokio::time::Instant> = None;

            'rounds: loop {
                if token.is_cancelled() {
                    cancelled = true;
                    break;
                }
                this.last_run.turns += 1;
                debug!(turn = this.last_run.turns, "Streaming model call");

                let request = this.request(&tools, search);
                let opened = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    r = this.provider.stream(request) => Some(r),
                };
                let mut rx = match opened {
                    None => {
                        cancelled = true;
                        break;
                    }
                    Some(Err(e)) => {
                        failure = Some(e.into());
                        break;
                    }
                    Some(Ok(rx)) => rx,
                };

                let mut acc = PartialMessage::default();
                let mut calls_announced = false;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        item = rx.recv() => Some(item),
                    };
                    let chunk = match next {
                        None => {
                            cancelled = true;
                            break;
                        }
                        Some(None) => break,
                        Some(Some(Err(e))) => {
                            failure = Some(e.into());
                            break;
                        }
                        Some(Some(Ok(chunk))) => chunk,
                    };
                    let Some(delta) = chunk.first_delta() else {
                        continue;
                    };
                    acc = acc.merged(delta);

                    if !calls_announced && acc.has_named_tool_call() {
                        calls_announced = true;
                        let (_, calls) = acc.clone().into_parts();
                        yield StreamingChunk::ToolCalls { tool_calls: calls };
                    }

                    if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
                        yield StreamingChunk::content(text);
                        if last_count.is_none_or(|t| t.elapsed() >= TOKEN_COUNT_INTERVAL) {
                            last_count = Some(tokio::time::Instant::now());
                            yield StreamingChunk::TokenCount {
                                token_count: input_tokens + output_tokens(&acc),
                            };
                        }
                    }
                }
                drop(rx);
                if cancelled || failure.is_some() {
                    break;
                }

                let (content, calls) = acc.into_parts();
                if calls.is_empty() {
                    this.record_answer(content);
                    break;
                }

                this.last_run.tool_rounds += 1;
                if !calls_announced {
                    yield StreamingChunk::ToolCalls { tool_calls: calls.clone() };
                }
                let first = this.record_tool_request(content, &calls);
                for (i, call) in calls.iter().enumerate() {
                    if token.is_cancelled() {
                        this.skip_tool_calls(first + i, &calls[i..]);
                        cancelled = true;
                        break 'rounds;
                    }
                    let result = this.dispatcher.dispatch(call).await;
                    this.record_tool_result(first + i, call, result.clone());
                    yield StreamingChunk::ToolResult {
                        tool_call: call.clone(),
                        tool_result: result,
                    };
                    if token.is_cancelled() {
                        this.skip_tool_calls(first + i + 1, &calls[i + 1..]);
                        cancelled = true;
                        break 'rounds;
                    }
                }

                input_tokens = estimate_input_tokens(&this.conversation);
                yield StreamingChunk::TokenCount { token_count: input_tokens };

                if let Some(warnings) = this.push_bound_warnings() {
                    for warning in warnings {
                        yield StreamingChunk::content(format!("\n\n{warning}"));
                    }
                    break;
                }
            }

            if cancelled {
                info!("Operation cancelled by user");
                yield StreamingChunk::content(CANCELLED_NOTICE);
            } else if let Some(e) = failure {
                warn!(error = %e, "Streaming model call failed");
                let text = format!("Sorry, I encountered an error: {e}");
                this.history.push(ChatEntry::assistant(&text));
                yield StreamingChunk::content(text);
            }

            this.track_output(&session, start, started);
            drop(session);
            yield StreamingChunk::Done;
        }
    }

    fn begin_run(&mut self, message: &str) {
        self.conversation.push(Message::user(message));
        self.history.push(ChatEntry::user(message));
        self.last_run = RunStats::default();
    }

    fn open_session(&self) -> SessionGuard {
        SessionGuard {
            id: self.telemetry.start_session(None),
            telemetry: Arc::clone(&self.telemetry),
        }
    }

    fn request(&self, tools: &[ToolDefinition], search: SearchParameters) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: self.conversation.messages.clone(),
            tools: tools.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            search: Some(search),
        }
    }

    /// Record a plain-text final answer.
    fn record_answer(&mut self, content: Option<String>) {
        let text = content
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(NO_SPECIFIC_RESPONSE)
            .to_string();
        self.conversation
            .push(Message::assistant_with_tools(content, Vec::new()));
        self.history.push(ChatEntry::assistant(text));
    }

    /// Record an assistant turn that requested tools, plus one pending entry
    /// per call. Returns the history index of the first pending entry.
    fn record_tool_request(&mut self, content: Option<String>, calls: &[ToolCall]) -> usize {
        debug!(tool_count = calls.len(), "Executing tool calls");
        let text = content
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(USING_TOOLS)
            .to_string();
        self.conversation
            .push(Message::assistant_with_tools(content, calls.to_vec()));
        self.history
            .push(ChatEntry::assistant_with_tools(text, calls.to_vec()));
        let first = self.history.len();
        self.history
            .extend(calls.iter().cloned().map(ChatEntry::tool_call));
        first
    }

    fn record_tool_result(&mut self, entry: usize, call: &ToolCall, result: ToolResult) {
        if !result.is_success() {
            debug!(tool = %call.name(), error = ?result.error(), "Tool reported failure");
        }
        self.conversation
            .push(Message::tool_result(&call.id, result.entry_text()));
        if let Some(e) = self.history.get_mut(entry) {
            e.resolve(result);
        }
    }

    /// Answer calls that will not run so every call id stays paired with a
    /// tool message.
    fn skip_tool_calls(&mut self, first_entry: usize, calls: &[ToolCall]) {
        for (i, call) in calls.iter().enumerate() {
            self.record_tool_result(
                first_entry + i,
                call,
                ToolResult::fail("Operation cancelled by user"),
            );
        }
    }

    /// Push a warning entry for every bound reached. Returns the warnings
    /// when the loop must stop.
    fn push_bound_warnings(&mut self) -> Option<Vec<String>> {
        let mut warnings = Vec::new();
        if self.last_run.tool_rounds >= self.max_tool_rounds {
            warnings.push(MAX_ROUNDS_WARNING.to_string());
        }
        if self.last_run.turns >= self.max_turns {
            warnings.push(format!(
                "Maximum turns ({}) reached. Stopping to prevent infinite loops.",
                self.max_turns
            ));
        }
        if warnings.is_empty() {
            return None;
        }
        warn!(
            tool_rounds = self.last_run.tool_rounds,
            turns = self.last_run.turns,
            "Loop bound reached"
        );
        self.history
            .extend(warnings.iter().map(ChatEntry::assistant));
        Some(warnings)
    }

    fn track_output(&self, session: &SessionGuard, start: usize, started: Instant) {
        let output = self.history[start..]
            .iter()
            .rev()
            .find(|e| e.kind == ChatEntryKind::Assistant)
            .map(|e| e.content.clone())
            .unwrap_or_default();
        self.telemetry.track_agent_output(AgentOutput {
            session_id: session.id.clone(),
            tokens_used: estimate_tokens(&output),
            output,
            model: self.model.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}

fn output_tokens(acc: &PartialMessage) -> usize {
    let content = acc.content.as_deref().map_or(0, estimate_tokens);
    let calls: usize = acc
        .tool_calls
        .iter()
        .flatten()
        .filter_map(|c| c.function.as_ref())
        .map(|f| {
            f.name.as_deref().map_or(0, estimate_tokens)
                + f.arguments.as_deref().map_or(0, estimate_tokens)
        })
        .sum();
    content + calls
}
