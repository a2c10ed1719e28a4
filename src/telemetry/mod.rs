//! Telemetry Emitter (component K): spans and counters around agent runs,
//! steps, LLM calls, and tool calls. Two always-available shapes
//! (`NoopEmitter`, `TracingEmitter`) plus an optional `otlp` feature.

#[cfg(feature = "otlp")]
pub mod otlp;

use std::collections::HashMap;

/// An attribute value attached to a span.
#[derive(Clone, Debug)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}
impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}
impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}
impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Int(v as i64)
    }
}
impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

pub type Attrs = HashMap<&'static str, AttrValue>;

/// A handle to one in-flight span. Dropping without calling `end` marks the
/// span as abandoned-but-not-erroring; callers are expected to call `end`
/// explicitly so success/failure status is recorded (the no-op emitter's
/// handle does nothing on drop either way, so this never panics).
pub trait Span: Send {
    fn end_ok(self: Box<Self>);
    fn end_err(self: Box<Self>, message: &str);
}

struct NoopSpan;
impl Span for NoopSpan {
    fn end_ok(self: Box<Self>) {}
    fn end_err(self: Box<Self>, _message: &str) {}
}

/// Emits spans and counters around the walk (spec §4.K). The no-op emitter
/// is the default; the core never checks for null handles, it just always
/// has one.
pub trait TelemetryEmitter: Send + Sync {
    fn start_span(&self, name: &str, attrs: Attrs) -> Box<dyn Span>;
    fn incr_counter(&self, name: &str, value: u64, attrs: Attrs);
}

/// Default emitter: produces dummy spans and swallows counters.
pub struct NoopEmitter;

impl TelemetryEmitter for NoopEmitter {
    fn start_span(&self, _name: &str, _attrs: Attrs) -> Box<dyn Span> {
        Box::new(NoopSpan)
    }
    fn incr_counter(&self, _name: &str, _value: u64, _attrs: Attrs) {}
}

struct TracingSpanHandle {
    span: tracing::Span,
}

impl Span for TracingSpanHandle {
    fn end_ok(self: Box<Self>) {
        self.span.in_scope(|| tracing::event!(tracing::Level::DEBUG, "span.ok"));
    }
    fn end_err(self: Box<Self>, message: &str) {
        self.span
            .in_scope(|| tracing::event!(tracing::Level::WARN, error = message, "span.error"));
    }
}

/// Maps spans to `tracing::Span`s and counters to `DEBUG`-level
/// `tracing::event!`s. This is in addition to, not instead of, the
/// structured emitter contract: `tracing` is for human-readable logs a
/// developer tails with `RUST_LOG`.
pub struct TracingEmitter;

impl TelemetryEmitter for TracingEmitter {
    fn start_span(&self, name: &str, attrs: Attrs) -> Box<dyn Span> {
        let span = tracing::info_span!("agent_span", name = name, attrs = ?attrs);
        Box::new(TracingSpanHandle { span })
    }

    fn incr_counter(&self, name: &str, value: u64, attrs: Attrs) {
        tracing::event!(tracing::Level::DEBUG, counter = name, value, attrs = ?attrs, "counter");
    }
}
