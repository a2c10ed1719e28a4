//! Optional OTLP export (`feature = "otlp"`). Builds a `tracing_opentelemetry`
//! layer backed by the `opentelemetry_sdk` batch span processor and a grpc
//! OTLP exporter, then bridges `TelemetryEmitter` spans/counters onto it the
//! same way `TracingEmitter` bridges onto plain `tracing`.

use opentelemetry::global;
use opentelemetry::trace::{Span as OtelSpanTrait, Tracer};
use opentelemetry_sdk::trace::TracerProvider;

use super::{Attrs, AttrValue, Span, TelemetryEmitter};

/// Installs a global `TracerProvider` exporting to `endpoint` over gRPC and
/// returns an emitter backed by it. Intended to be constructed once at
/// process startup when `OTEL_EXPORTER_OTLP_ENDPOINT` is set (spec §6).
pub struct OtlpEmitter {
    provider: TracerProvider,
}

impl OtlpEmitter {
    pub fn install(endpoint: &str) -> Result<Self, opentelemetry_otlp::ExporterBuildError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;
        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .build();
        global::set_tracer_provider(provider.clone());
        Ok(Self { provider })
    }
}

impl Drop for OtlpEmitter {
    fn drop(&mut self) {
        let _ = self.provider.shutdown();
    }
}

struct OtlpSpanHandle {
    span: opentelemetry::global::BoxedSpan,
}

impl Span for OtlpSpanHandle {
    fn end_ok(self: Box<Self>) {
        let mut span = self.span;
        span.set_status(opentelemetry::trace::Status::Ok);
        span.end();
    }

    fn end_err(self: Box<Self>, message: &str) {
        let mut span = self.span;
        span.set_status(opentelemetry::trace::Status::error(message.to_string()));
        span.end();
    }
}

impl TelemetryEmitter for OtlpEmitter {
    fn start_span(&self, name: &str, attrs: Attrs) -> Box<dyn Span> {
        let tracer = global::tracer("skein");
        let mut builder = tracer.span_builder(name.to_string());
        builder.attributes = Some(
            attrs
                .into_iter()
                .map(|(k, v)| opentelemetry::KeyValue::new(k, to_otel_value(v)))
                .collect(),
        );
        let span = tracer.build(builder);
        Box::new(OtlpSpanHandle { span })
    }

    fn incr_counter(&self, name: &str, value: u64, attrs: Attrs) {
        let meter = global::meter("skein");
        let counter = meter.u64_counter(name.to_string()).build();
        let kvs: Vec<opentelemetry::KeyValue> = attrs
            .into_iter()
            .map(|(k, v)| opentelemetry::KeyValue::new(k, to_otel_value(v)))
            .collect();
        counter.add(value, &kvs);
    }
}

fn to_otel_value(v: AttrValue) -> opentelemetry::Value {
    match v {
        AttrValue::Str(s) => opentelemetry::Value::String(s.into()),
        AttrValue::Int(i) => opentelemetry::Value::I64(i),
        AttrValue::Bool(b) => opentelemetry::Value::Bool(b),
    }
}
