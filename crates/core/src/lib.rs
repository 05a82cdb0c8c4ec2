//! # Quill Core
//!
//! Domain types, traits, and error definitions shared by every Quill crate.
//! Nothing in here talks to the network or the filesystem; it only defines
//! the shapes that the agent loop, the model client and the tools agree on.
//!
//! - [`message`]: the model-facing conversation (wire shape)
//! - [`chat`]: the UI-facing chat log
//! - [`tool`]: the result envelope and the plugin tool seam
//! - [`provider`]: the model client trait plus request/response/delta types

pub mod chat;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

pub use chat::{ChatEntry, ChatEntryKind};
pub use error::{ProviderError, ToolError};
pub use message::{Conversation, ConversationId, FunctionCall, Message, Role, ToolCall};
pub use provider::{
    Choice, ChunkReceiver, DeltaChoice, FunctionDelta, MessageDelta, Provider, ProviderRequest,
    ProviderResponse, SearchMode, SearchParameters, StreamChunk, ToolCallDelta, ToolDefinition,
    Usage,
};
pub use tool::{Tool, ToolRegistry, ToolResult};
