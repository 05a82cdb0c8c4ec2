//! Thread-safe telemetry engine: opens session traces, records agent
//! output spans, and hands finished traces to the exporter.

use std::collections::HashMap;
use std::sync::RwLock;

use quill_config::TelemetrySettings;
use tracing::debug;
use uuid::Uuid;

use crate::export::Exporter;
use crate::model::{AgentOutput, SessionTrace, Span, SpanKind};

/// Finished spans kept for inspection.
const MAX_FINISHED: usize = 1_000;

/// The telemetry engine.
///
/// When disabled every operation is a no-op apart from handing out
/// session ids, so callers never branch on whether telemetry is on.
pub struct TelemetryEngine {
    settings: TelemetrySettings,
    exporter: Exporter,
    sessions: RwLock<HashMap<String, SessionTrace>>,
    finished: RwLock<Vec<Span>>,
}

impl TelemetryEngine {
    pub fn new(settings: TelemetrySettings) -> Self {
        let exporter = if settings.enabled {
            Exporter::from_settings(&settings)
        } else {
            Exporter::None
        };
        Self {
            settings,
            exporter,
            sessions: RwLock::new(HashMap::new()),
            finished: RwLock::new(Vec::new()),
        }
    }

    /// An engine that records and exports nothing.
    pub fn disabled() -> Self {
        Self::new(TelemetrySettings::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Open a session trace. Always returns an id, even when disabled or
    /// when the session is not sampled.
    pub fn start_session(&self, session_id: Option<String>) -> String {
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if !self.is_enabled() || !self.sampled() {
            return id;
        }
        debug!(session_id = %id, "Telemetry session started");
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), SessionTrace::new(id.clone()));
        id
    }

    /// Record what the agent produced as a child of the session span.
    pub fn track_agent_output(&self, output: AgentOutput) {
        if !self.is_enabled() {
            return;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let Some(session) = sessions.get_mut(&output.session_id) else {
            return;
        };

        let mut span = Span::new(
            SpanKind::AgentOutput,
            "agent.output",
            session.root.trace_id.clone(),
        )
        .with_parent(session.root.id.clone());
        span.set_attribute("session.id", output.session_id.clone());
        span.set_attribute("model", output.model);
        span.set_attribute("tokens.used", output.tokens_used as u64);
        span.set_attribute("duration_ms", output.duration_ms);
        span.set_attribute("output.length", output.output.chars().count() as u64);
        span.set_attribute("output", output.output);
        span.end();
        session.children.push(span);
    }

    /// Close the session and export its spans.
    pub fn end_session(&self, session_id: &str) {
        if !self.is_enabled() {
            return;
        }
        let Some(session) = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id)
        else {
            return;
        };

        let spans = session.finish();
        debug!(session_id = %session_id, spans = spans.len(), "Telemetry session ended");

        {
            let mut finished = self.finished.write().unwrap_or_else(|e| e.into_inner());
            finished.extend(spans.iter().cloned());
            if finished.len() > MAX_FINISHED {
                let excess = finished.len() - MAX_FINISHED;
                finished.drain(..excess);
            }
        }
        self.exporter.export(spans);
    }

    /// Spans of every ended session, oldest first.
    pub fn finished_spans(&self) -> Vec<Span> {
        self.finished
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn sampled(&self) -> bool {
        let ratio = self.settings.trace_sample_ratio;
        if ratio >= 1.0 {
            return true;
        }
        if ratio <= 0.0 {
            return false;
        }
        let bits = (Uuid::new_v4().as_u128() >> 64) as u64;
        (bits as f64 / u64::MAX as f64) < ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_config::TelemetryExporter;

    fn recording_engine() -> TelemetryEngine {
        TelemetryEngine::new(TelemetrySettings {
            enabled: true,
            exporter: TelemetryExporter::None,
            ..TelemetrySettings::default()
        })
    }

    fn output(session_id: &str) -> AgentOutput {
        AgentOutput {
            session_id: session_id.into(),
            output: "Done.".into(),
            model: "grok-code-fast-1".into(),
            tokens_used: 2,
            duration_ms: 15,
        }
    }

    #[test]
    fn disabled_engine_is_a_no_op() {
        let engine = TelemetryEngine::disabled();
        let id = engine.start_session(None);
        assert!(!id.is_empty());
        engine.track_agent_output(output(&id));
        engine.end_session(&id);
        assert!(engine.finished_spans().is_empty());
        assert_eq!(engine.open_sessions(), 0);
    }

    #[test]
    fn records_session_and_output_spans() {
        let engine = recording_engine();
        let id = engine.start_session(Some("abc".into()));
        assert_eq!(id, "abc");
        assert_eq!(engine.open_sessions(), 1);

        engine.track_agent_output(output(&id));
        engine.end_session(&id);

        let spans = engine.finished_spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, SpanKind::Session);
        assert_eq!(spans[1].kind, SpanKind::AgentOutput);
        assert_eq!(spans[1].trace_id, spans[0].trace_id);
        assert_eq!(spans[1].attributes["tokens.used"], 2);
        assert_eq!(engine.open_sessions(), 0);
    }

    #[test]
    fn output_for_unknown_session_is_ignored() {
        let engine = recording_engine();
        engine.track_agent_output(output("missing"));
        engine.end_session("missing");
        assert!(engine.finished_spans().is_empty());
    }

    #[test]
    fn zero_sample_ratio_records_nothing() {
        let engine = TelemetryEngine::new(TelemetrySettings {
            enabled: true,
            exporter: TelemetryExporter::None,
            trace_sample_ratio: 0.0,
            ..TelemetrySettings::default()
        });
        let id = engine.start_session(None);
        engine.end_session(&id);
        assert!(engine.finished_spans().is_empty());
    }

    #[tokio::test]
    async fn otlp_export_failure_does_not_surface() {
        let engine = TelemetryEngine::new(TelemetrySettings {
            enabled: true,
            exporter: TelemetryExporter::Otlp,
            endpoint: "http://127.0.0.1:9".into(),
            ..TelemetrySettings::default()
        });
        let id = engine.start_session(None);
        engine.end_session(&id);
        assert_eq!(engine.finished_spans().len(), 1);
    }
}
