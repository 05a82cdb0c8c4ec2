//! Session tracing for Quill agents.
//!
//! Each `process_user_message*` call opens a session span; the agent's
//! output is recorded as a child span. Finished sessions are exported
//! fire-and-forget to the console (through `tracing`) or to an OTLP/HTTP
//! collector. Telemetry is off by default and never fails the agent.

pub mod engine;
pub mod export;
pub mod model;

pub use engine::TelemetryEngine;
pub use export::Exporter;
pub use model::{AgentOutput, SessionTrace, Span, SpanKind};
pub use quill_config::{TelemetryExporter, TelemetrySettings};
