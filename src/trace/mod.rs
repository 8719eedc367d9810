//! Tracing/profiling event sink
//!
//! The supervision layers talk to an optional [`Tracer`] through a narrow
//! interface: open a span, record an event, note a timeout. Every call site
//! accepts `Option<&dyn Tracer>` so a run without tracing pays nothing.
//!
//! [`TraceRecorder`] is the in-process implementation used by `warden run
//! --trace-out`; it keeps everything in memory and writes one JSON artifact
//! when the run finishes.

mod recorder;
mod redact;

use serde_json::{Map, Value};

use crate::liveness::ReasonToken;

pub use recorder::{RunTrace, TraceRecorder, TraceSummary};
pub use redact::sanitize_attrs;

/// Free-form attributes attached to spans and events
pub type Attrs = Map<String, Value>;

/// Identifier of an open or finished span (`s1`, `s2`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanId(pub String);

impl SpanId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Final status recorded on a span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
    Timeout,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Ok => "ok",
            SpanStatus::Error => "error",
            SpanStatus::Timeout => "timeout",
        }
    }
}

/// Append-only sink for spans and events
///
/// Implementations must be safe to call from any worker thread.
pub trait Tracer: Send + Sync {
    fn start_span(
        &self,
        name: &str,
        kind: &str,
        phase: &str,
        parent: Option<&SpanId>,
        attrs: Attrs,
    ) -> SpanId;

    fn finish_span(&self, span: &SpanId, status: SpanStatus);

    fn event(&self, kind: &str, span: Option<&SpanId>, attrs: Attrs);

    /// Record a watchdog event carrying `reason`
    fn note_timeout(&self, reason: ReasonToken, span: Option<&SpanId>, mut attrs: Attrs) {
        attrs.insert(
            "reason_token".to_string(),
            Value::String(reason.as_str().to_string()),
        );
        self.event("watchdog", span, attrs);
    }
}

/// Scope guard that finishes its span on drop
pub struct SpanGuard<'a> {
    tracer: &'a dyn Tracer,
    id: SpanId,
    status: SpanStatus,
}

impl<'a> SpanGuard<'a> {
    pub fn enter(
        tracer: &'a dyn Tracer,
        name: &str,
        kind: &str,
        phase: &str,
        parent: Option<&SpanId>,
        attrs: Attrs,
    ) -> Self {
        let id = tracer.start_span(name, kind, phase, parent, attrs);
        Self {
            tracer,
            id,
            status: SpanStatus::Ok,
        }
    }

    pub fn id(&self) -> &SpanId {
        &self.id
    }

    pub fn set_status(&mut self, status: SpanStatus) {
        self.status = status;
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        self.tracer.finish_span(&self.id, self.status);
    }
}

/// Open a span when a tracer is present
pub fn span<'a>(
    tracer: Option<&'a dyn Tracer>,
    name: &str,
    kind: &str,
    phase: &str,
    parent: Option<&SpanId>,
    attrs: Attrs,
) -> Option<SpanGuard<'a>> {
    tracer.map(|t| SpanGuard::enter(t, name, kind, phase, parent, attrs))
}

/// Record an event when a tracer is present
pub fn event(tracer: Option<&dyn Tracer>, kind: &str, span: Option<&SpanId>, attrs: Attrs) {
    if let Some(t) = tracer {
        t.event(kind, span, attrs);
    }
}

/// Turn a `json!({...})` object into [`Attrs`]; anything else becomes empty
pub fn attrs(value: Value) -> Attrs {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
