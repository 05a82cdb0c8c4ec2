//! Data model for session traces and spans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// One `process_user_message*` call, root of its trace.
    Session,
    /// The agent's final output for a session.
    AgentOutput,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::AgentOutput => write!(f, "agent_output"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// 16 hex chars, OTLP span id format
    pub id: String,
    /// 32 hex chars, shared by every span of one session
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub kind: SpanKind,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    pub fn new(kind: SpanKind, name: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            id: new_span_id(),
            trace_id: trace_id.into(),
            parent_id: None,
            kind,
            name: name.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Mark the span as ended now.
    pub fn end(&mut self) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// An open session: its root span plus finished children.
#[derive(Debug, Clone)]
pub struct SessionTrace {
    pub session_id: String,
    pub root: Span,
    pub children: Vec<Span>,
}

impl SessionTrace {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let mut root = Span::new(SpanKind::Session, "session", new_trace_id());
        root.set_attribute("session.id", session_id.clone());
        Self {
            session_id,
            root,
            children: Vec::new(),
        }
    }

    /// Close the root and return every span, root first.
    pub fn finish(mut self) -> Vec<Span> {
        self.root.end();
        let mut spans = Vec::with_capacity(self.children.len() + 1);
        spans.push(self.root);
        spans.extend(self.children);
        spans
    }
}

/// What the agent produced for one session.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub session_id: String,
    pub output: String,
    pub model: String,
    pub tokens_used: usize,
    pub duration_ms: u64,
}

pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_formats() {
        assert_eq!(new_trace_id().len(), 32);
        assert_eq!(new_span_id().len(), 16);
        assert!(new_span_id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn span_end_sets_duration() {
        let mut span = Span::new(SpanKind::AgentOutput, "agent.output", new_trace_id());
        assert!(!span.is_ended());
        span.end();
        assert!(span.is_ended());
        assert!(span.duration_ms.is_some());
    }

    #[test]
    fn session_finish_puts_root_first() {
        let mut session = SessionTrace::new("s-1");
        let child = Span::new(SpanKind::AgentOutput, "agent.output", session.root.trace_id.clone())
            .with_parent(session.root.id.clone());
        session.children.push(child);

        let spans = session.finish();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, SpanKind::Session);
        assert!(spans[0].is_ended());
        assert_eq!(spans[1].parent_id.as_deref(), Some(spans[0].id.as_str()));
        assert_eq!(spans[0].attributes["session.id"], "s-1");
    }
}
