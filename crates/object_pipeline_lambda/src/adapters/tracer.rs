use opentelemetry::trace::{Span as _, SpanKind, Status, Tracer as _};
use opentelemetry::KeyValue;
use object_pipeline_core::telemetry::{SpanHandle, TraceContext, Tracer};

/// [`Tracer`] backed by an OpenTelemetry SDK tracer; spans go to whatever
/// processors the provider was built with.
#[derive(Clone)]
pub struct OtelTracer {
    tracer: opentelemetry_sdk::trace::Tracer,
}

impl OtelTracer {
    pub fn new(tracer: opentelemetry_sdk::trace::Tracer) -> Self {
        Self { tracer }
    }
}

impl Tracer for OtelTracer {
    fn start_span(
        &self,
        parent: &TraceContext,
        name: &str,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> Box<dyn SpanHandle> {
        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, &parent.to_otel_context());
        Box::new(OtelSpan { span })
    }
}

struct OtelSpan {
    span: opentelemetry_sdk::trace::Span,
}

impl SpanHandle for OtelSpan {
    fn context(&self) -> TraceContext {
        TraceContext::from_span_context(self.span.span_context().clone())
    }

    fn set_attributes(&mut self, attributes: Vec<KeyValue>) {
        self.span.set_attributes(attributes);
    }

    fn add_event(&mut self, name: &str, attributes: Vec<KeyValue>) {
        self.span.add_event(name.to_string(), attributes);
    }

    fn set_error(&mut self, description: &str) {
        self.span.set_status(Status::error(description.to_string()));
    }

    fn end(&mut self) {
        self.span.end();
    }
}
