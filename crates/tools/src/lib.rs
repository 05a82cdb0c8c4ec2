//! Built-in tools for the Quill agent.
//!
//! Each tool takes the working directory at construction and resolves
//! relative paths against it. Every operation returns the
//! `quill_core::ToolResult` envelope rather than an error.

pub mod bash;
pub mod morph;
pub mod schema;
pub mod search;
pub mod text_editor;
pub mod todo;

pub use bash::BashTool;
pub use morph::MorphEditorTool;
pub use schema::builtin_definitions;
pub use search::{SearchOptions, SearchTool, SearchType};
pub use text_editor::TextEditorTool;
pub use todo::{TodoItem, TodoPriority, TodoStatus, TodoTool, TodoUpdate};
