//! In-memory tracer that renders a run-trace artifact

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::redact::sanitize_attrs;
use super::{Attrs, SpanId, SpanStatus, Tracer};
use crate::utils::duration_ms;

/// Number of spans listed in the summary
const SLOWEST_SPAN_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub kind: String,
    pub name: String,
    pub phase: String,
    pub start_ms: f64,
    pub end_ms: Option<f64>,
    pub duration_ms: Option<f64>,
    pub status: String,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub ts_ms: f64,
    pub kind: String,
    pub span_id: Option<String>,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlowSpan {
    pub span_id: String,
    pub name: String,
    pub phase: String,
    pub duration_ms: f64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub span_count: usize,
    pub event_count: usize,
    pub status: String,
    pub slowest_spans: Vec<SlowSpan>,
    pub timeout_event_count: usize,
    pub last_event: Option<EventRecord>,
}

/// Serialized form of a finished trace
#[derive(Debug, Clone, Serialize)]
pub struct RunTrace {
    pub version: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: String,
    pub spans: Vec<SpanRecord>,
    pub events: Vec<EventRecord>,
    pub summary: TraceSummary,
}

#[derive(Debug, Default)]
struct TraceState {
    counter: u64,
    spans: Vec<SpanRecord>,
    events: Vec<EventRecord>,
}

/// Collects spans and events from every worker behind one mutex
#[derive(Debug)]
pub struct TraceRecorder {
    run_id: String,
    started_at: DateTime<Utc>,
    origin: Instant,
    state: Mutex<TraceState>,
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceRecorder {
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("run-{}", started_at.timestamp_millis()),
            started_at,
            origin: Instant::now(),
            state: Mutex::new(TraceState::default()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn lock(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> f64 {
        duration_ms(self.origin.elapsed())
    }

    /// Snapshot of all events recorded so far
    pub fn events(&self) -> Vec<EventRecord> {
        self.lock().events.clone()
    }

    /// Snapshot of all spans recorded so far
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.lock().spans.clone()
    }

    /// Render the artifact; spans still open are left without an end time
    pub fn finish(&self, status: &str) -> RunTrace {
        let state = self.lock();
        let mut finished: Vec<&SpanRecord> = state
            .spans
            .iter()
            .filter(|s| s.duration_ms.is_some())
            .collect();
        finished.sort_by(|a, b| {
            b.duration_ms
                .unwrap_or(0.0)
                .total_cmp(&a.duration_ms.unwrap_or(0.0))
        });

        let summary = TraceSummary {
            span_count: state.spans.len(),
            event_count: state.events.len(),
            status: status.to_string(),
            slowest_spans: finished
                .iter()
                .take(SLOWEST_SPAN_LIMIT)
                .map(|s| SlowSpan {
                    span_id: s.span_id.clone(),
                    name: s.name.clone(),
                    phase: s.phase.clone(),
                    duration_ms: s.duration_ms.unwrap_or(0.0),
                    status: s.status.clone(),
                })
                .collect(),
            timeout_event_count: state
                .events
                .iter()
                .filter(|e| e.kind == "watchdog" && e.attrs.contains_key("reason_token"))
                .count(),
            last_event: state.events.last().cloned(),
        };

        RunTrace {
            version: 1,
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            status: status.to_string(),
            spans: state.spans.clone(),
            events: state.events.clone(),
            summary,
        }
    }
}

impl Tracer for TraceRecorder {
    fn start_span(
        &self,
        name: &str,
        kind: &str,
        phase: &str,
        parent: Option<&SpanId>,
        attrs: Attrs,
    ) -> SpanId {
        let start_ms = self.now_ms();
        let mut state = self.lock();
        state.counter += 1;
        let id = format!("s{}", state.counter);
        state.spans.push(SpanRecord {
            span_id: id.clone(),
            parent_span_id: parent.map(|p| p.0.clone()),
            kind: kind.to_string(),
            name: name.to_string(),
            phase: phase.to_string(),
            start_ms,
            end_ms: None,
            duration_ms: None,
            status: SpanStatus::Ok.as_str().to_string(),
            attrs: sanitize_attrs(attrs),
        });
        SpanId(id)
    }

    fn finish_span(&self, span: &SpanId, status: SpanStatus) {
        let end_ms = self.now_ms();
        let mut state = self.lock();
        if let Some(record) = state
            .spans
            .iter_mut()
            .rev()
            .find(|s| s.span_id == span.0)
        {
            if record.end_ms.is_some() {
                return;
            }
            record.end_ms = Some(end_ms);
            record.duration_ms = Some(((end_ms - record.start_ms) * 1000.0).round() / 1000.0);
            record.status = status.as_str().to_string();
        }
    }

    fn event(&self, kind: &str, span: Option<&SpanId>, attrs: Attrs) {
        let ts_ms = self.now_ms();
        self.lock().events.push(EventRecord {
            ts_ms,
            kind: kind.to_string(),
            span_id: span.map(|s| s.0.clone()),
            attrs: sanitize_attrs(attrs),
        });
    }
}

impl EventRecord {
    /// String attribute lookup, mostly for assertions and diagnostics
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}
