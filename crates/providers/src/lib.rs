//! Model client implementations for Quill.
//!
//! All clients implement the `quill_core::Provider` trait.

pub mod grok;

pub use grok::GrokClient;
