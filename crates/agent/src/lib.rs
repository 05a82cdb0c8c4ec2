//! The Quill agent: a conversational loop that lets a model read, edit and
//! search the working tree through tools.
//!
//! [`AgentLoop`] owns the conversation. Each user message runs rounds of
//! model call, tool dispatch and result feedback until the model answers
//! in plain text or a round/turn bound is hit. The streaming variant yields
//! [`StreamingChunk`]s as deltas arrive and can be cancelled through an
//! [`AbortHandle`].

pub mod delta;
pub mod dispatch;
pub mod loop_runner;
pub mod prompt;
pub mod search_mode;
pub mod stream_event;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use delta::{PartialFunction, PartialMessage, PartialToolCall};
pub use dispatch::{BuiltinTool, ToolDispatcher, ToolTarget};
pub use loop_runner::{AbortHandle, AgentLoop, RunStats};
pub use prompt::{PromptContext, build_system_prompt};
pub use search_mode::search_mode_for;
pub use stream_event::StreamingChunk;
