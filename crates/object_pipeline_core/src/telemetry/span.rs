use opentelemetry::trace::{SpanContext, SpanKind, TraceContextExt};
use opentelemetry::{Context, KeyValue};

use crate::contract::Stage;
use crate::error::StageError;
use crate::telemetry::semconv;

/// Causal position of a span, carried between stages.
///
/// An invalid (empty) context means "no parent": spans started from it are
/// new roots.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceContext(SpanContext);

impl TraceContext {
    pub fn root() -> Self {
        Self(SpanContext::empty_context())
    }

    pub fn from_span_context(span_context: SpanContext) -> Self {
        Self(span_context)
    }

    pub fn from_otel_context(cx: &Context) -> Self {
        Self(cx.span().span_context().clone())
    }

    pub fn span_context(&self) -> &SpanContext {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    /// 32 lowercase hex digits, as written to log records.
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.0.trace_id())
    }

    /// 16 lowercase hex digits, as written to log records.
    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.0.span_id())
    }

    /// OpenTelemetry context to start children from.
    pub fn to_otel_context(&self) -> Context {
        if self.is_valid() {
            Context::new().with_remote_span_context(self.0.clone())
        } else {
            Context::new()
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::root()
    }
}

/// Span factory the stages record through.
pub trait Tracer: Send + Sync {
    fn start_span(
        &self,
        parent: &TraceContext,
        name: &str,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> Box<dyn SpanHandle>;
}

/// One open span. Implementations must tolerate `end` being the last call;
/// [`SpanRecorder`] guarantees it is called exactly once.
pub trait SpanHandle: Send {
    fn context(&self) -> TraceContext;
    fn set_attributes(&mut self, attributes: Vec<KeyValue>);
    fn add_event(&mut self, name: &str, attributes: Vec<KeyValue>);
    fn set_error(&mut self, description: &str);
    fn end(&mut self);
}

const CANCELLED_EXCEPTION_TYPE: &str = "Cancelled";
const CANCELLED_MESSAGE: &str = "invocation cancelled before the step finished";

/// Scoped span owned by one stage step.
///
/// The span is ended exactly once: by [`SpanRecorder::end`] or, on any other
/// exit path, when the recorder is dropped. A recorder dropped while still
/// open was abandoned mid-step (the invocation future was cancelled) and is
/// closed as failed.
pub struct SpanRecorder {
    handle: Box<dyn SpanHandle>,
    stage: Stage,
    open: bool,
    expects_outcome: bool,
    outcome_recorded: bool,
}

impl SpanRecorder {
    pub fn start(
        tracer: &dyn Tracer,
        stage: Stage,
        parent: &TraceContext,
        name: &str,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Self {
            handle: tracer.start_span(parent, name, kind, attributes),
            stage,
            open: true,
            expects_outcome: false,
            outcome_recorded: false,
        }
    }

    /// Marks this as a stage root span: if it is abandoned before an outcome
    /// was recorded, a failed outcome event is emitted on drop.
    pub fn expecting_outcome(mut self) -> Self {
        self.expects_outcome = true;
        self
    }

    /// Starts a span whose parent is this one.
    pub fn start_child(
        &self,
        tracer: &dyn Tracer,
        name: &str,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Self::start(tracer, self.stage, &self.context(), name, kind, attributes)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn context(&self) -> TraceContext {
        self.handle.context()
    }

    pub fn set_attributes(&mut self, attributes: Vec<KeyValue>) {
        self.handle.set_attributes(attributes);
    }

    /// Appends the stage's outcome event, e.g. `LambdaUpdateEvent`.
    pub fn record_outcome(&mut self, is_successful: bool, extra_attributes: Vec<KeyValue>) {
        let mut attributes = Vec::with_capacity(extra_attributes.len() + 1);
        attributes.push(KeyValue::new(semconv::IS_SUCCESSFUL, is_successful));
        attributes.extend(extra_attributes);
        self.handle.add_event(self.stage.event_name(), attributes);
        self.outcome_recorded = true;
    }

    /// Marks the span failed and records the error as an escaped exception.
    pub fn record_failure(&mut self, error: &StageError) {
        self.record_exception(error.kind(), error.to_string());
    }

    fn record_exception(&mut self, kind: &'static str, message: String) {
        self.handle.set_error(self.stage.error_description());
        self.handle.add_event(
            semconv::EXCEPTION_EVENT,
            vec![
                KeyValue::new(semconv::EXCEPTION_TYPE, kind),
                KeyValue::new(semconv::EXCEPTION_MESSAGE, message),
                KeyValue::new(semconv::EXCEPTION_ESCAPED, true),
            ],
        );
    }

    pub fn end(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.handle.end();
        }
    }
}

impl Drop for SpanRecorder {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.record_exception(CANCELLED_EXCEPTION_TYPE, CANCELLED_MESSAGE.to_string());
        if self.expects_outcome && !self.outcome_recorded {
            self.record_outcome(false, Vec::new());
        }
        tracing::warn!(
            stage = self.stage.as_str(),
            trace.id = self.context().trace_id_hex().as_str(),
            span.id = self.context().span_id_hex().as_str(),
            "span abandoned before the step finished"
        );
        self.close();
    }
}
