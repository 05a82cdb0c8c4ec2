//! Span exporters: console (via `tracing`) and OTLP/HTTP JSON.
//!
//! Export never blocks the caller and never fails it. OTLP posts run on a
//! spawned task when a tokio runtime is available; errors are logged at
//! debug level and dropped.

use std::time::Duration;

use quill_config::{TelemetryExporter, TelemetrySettings};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::model::Span;

pub enum Exporter {
    Console,
    Otlp {
        client: reqwest::Client,
        url: String,
        resource: Value,
    },
    None,
}

impl Exporter {
    pub fn from_settings(settings: &TelemetrySettings) -> Self {
        match settings.exporter {
            TelemetryExporter::Console => Self::Console,
            TelemetryExporter::None => Self::None,
            TelemetryExporter::Otlp => {
                let client = match reqwest::Client::builder()
                    .timeout(Duration::from_secs(10))
                    .build()
                {
                    Ok(c) => c,
                    Err(e) => {
                        debug!(error = %e, "OTLP client unavailable, spans will not be exported");
                        return Self::None;
                    }
                };
                Self::Otlp {
                    client,
                    url: format!("{}/v1/traces", settings.endpoint.trim_end_matches('/')),
                    resource: resource(settings),
                }
            }
        }
    }

    pub fn export(&self, spans: Vec<Span>) {
        if spans.is_empty() {
            return;
        }
        match self {
            Self::None => {}
            Self::Console => {
                for span in &spans {
                    let attributes = Value::Object(span.attributes.clone());
                    info!(
                        target: "quill::telemetry",
                        trace_id = %span.trace_id,
                        span_id = %span.id,
                        name = %span.name,
                        duration_ms = span.duration_ms.unwrap_or(0),
                        attributes = %attributes,
                        "span"
                    );
                }
            }
            Self::Otlp {
                client,
                url,
                resource,
            } => {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    debug!("No tokio runtime, dropping {} span(s)", spans.len());
                    return;
                };
                let body = otlp_payload(resource, &spans);
                let request = client.post(url.as_str()).json(&body);
                handle.spawn(async move {
                    match request.send().await {
                        Ok(resp) if resp.status().is_success() => {}
                        Ok(resp) => debug!(status = %resp.status(), "OTLP export rejected"),
                        Err(e) => debug!(error = %e, "OTLP export failed"),
                    }
                });
            }
        }
    }
}

fn resource(settings: &TelemetrySettings) -> Value {
    json!({
        "attributes": [
            string_attr("service.name", &settings.service_name),
            string_attr("service.version", &settings.service_version),
        ]
    })
}

fn string_attr(key: &str, value: &str) -> Value {
    json!({ "key": key, "value": { "stringValue": value } })
}

fn any_value(value: &Value) -> Value {
    match value {
        Value::String(s) => json!({ "stringValue": s }),
        Value::Bool(b) => json!({ "boolValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "intValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        other => json!({ "stringValue": other.to_string() }),
    }
}

fn nanos(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.timestamp_nanos_opt().unwrap_or_default().to_string()
}

/// Build an OTLP/JSON `ExportTraceServiceRequest` body.
pub fn otlp_payload(resource: &Value, spans: &[Span]) -> Value {
    let spans: Vec<Value> = spans
        .iter()
        .map(|s| {
            let attributes: Vec<Value> = s
                .attributes
                .iter()
                .map(|(k, v)| json!({ "key": k, "value": any_value(v) }))
                .collect();
            let mut span = json!({
                "traceId": s.trace_id,
                "spanId": s.id,
                "name": s.name,
                "kind": 1,
                "startTimeUnixNano": nanos(s.started_at),
                "endTimeUnixNano": nanos(s.ended_at.unwrap_or(s.started_at)),
                "attributes": attributes,
            });
            if let Some(parent) = &s.parent_id {
                span["parentSpanId"] = json!(parent);
            }
            span
        })
        .collect();

    json!({
        "resourceSpans": [{
            "resource": resource,
            "scopeSpans": [{
                "scope": { "name": "quill" },
                "spans": spans,
            }]
        }]
    })
}
