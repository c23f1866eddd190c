use std::future::Future;

use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;

use crate::config::{BatchPolicy, PipelineConfig};
use crate::contract::{Stage, HANDLER_SPAN_NAME, WRONG_BUCKET_NAME};
use crate::error::StageError;
use crate::fault::FaultInjector;
use crate::telemetry::{semconv, SpanRecorder, TraceCarrier, TraceContext, Tracer};

pub mod check;
pub mod create;
pub mod delete;
pub mod update;

pub use check::CheckStage;
pub use create::CreateStage;
pub use delete::DeleteStage;
pub use update::UpdateStage;

/// Shared, invocation-scoped dependencies handed to every stage.
pub struct StageContext<'a> {
    pub config: &'a PipelineConfig,
    pub tracer: &'a dyn Tracer,
    pub faults: &'a FaultInjector,
    /// Platform request id of the current invocation, when known.
    pub request_id: Option<String>,
}

impl<'a> StageContext<'a> {
    pub fn new(config: &'a PipelineConfig, tracer: &'a dyn Tracer, faults: &'a FaultInjector) -> Self {
        Self {
            config,
            tracer,
            faults,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    fn start_root(&self, stage: Stage, carrier: &dyn TraceCarrier) -> SpanRecorder {
        self.start_root_from(stage, &carrier.parent_context(), carrier.span_kind(), carrier.root_attributes())
    }

    fn start_root_from(
        &self,
        stage: Stage,
        parent: &TraceContext,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> SpanRecorder {
        SpanRecorder::start(self.tracer, stage, parent, HANDLER_SPAN_NAME, kind, attributes)
            .expecting_outcome()
    }

    /// Records a trigger (or one of its records) that could not be decoded on
    /// a fresh root span and hands the error back.
    fn reject(
        &self,
        stage: Stage,
        kind: SpanKind,
        trigger: &'static str,
        error: StageError,
    ) -> StageError {
        let span = self.start_root_from(
            stage,
            &TraceContext::root(),
            kind,
            vec![KeyValue::new(semconv::FAAS_TRIGGER, trigger)],
        );
        let result: Result<(), StageError> = Err(error.clone());
        self.finish(span, &Progress::default(), &result, Vec::new());
        error
    }

    /// Consults the injector for `stage` and picks the bucket for the next
    /// write. The real call is always issued.
    fn fault_target<'b>(&self, span: &mut SpanRecorder, bucket: &'b str) -> &'b str {
        let stage = span.stage();
        let decision = self.faults.decide(self.config.fault_rates.for_stage(stage));
        if decision.is_injected() {
            span.set_attributes(vec![KeyValue::new(semconv::FAULT_INJECTED, true)]);
            tracing::warn!(
                stage = stage.as_str(),
                bucket,
                substitute = WRONG_BUCKET_NAME,
                "fault injected"
            );
        }
        decision.target(bucket, WRONG_BUCKET_NAME)
    }

    /// Records the final outcome on the root span and closes it.
    fn finish<T>(
        &self,
        mut span: SpanRecorder,
        progress: &Progress,
        result: &Result<T, StageError>,
        mut extra: Vec<KeyValue>,
    ) {
        let stage = span.stage();
        if let Some(correlation_id) = &progress.correlation_id {
            span.set_attributes(vec![KeyValue::new(semconv::CORRELATION_ID, correlation_id.clone())]);
        }
        if let Some(request_id) = &self.request_id {
            extra.push(KeyValue::new(semconv::AWS_REQUEST_ID, request_id.clone()));
        }
        if let Some(bucket) = &progress.bucket {
            extra.push(KeyValue::new(semconv::BUCKET_ID, bucket.clone()));
        }
        if let Some(key) = &progress.key {
            extra.push(KeyValue::new(semconv::KEY_NAME, key.clone()));
        }

        let context = span.context();
        let trace_id = context.trace_id_hex();
        let span_id = context.span_id_hex();
        let correlation_id = progress.correlation_id.as_deref().unwrap_or_default();
        let bucket = progress.bucket.as_deref().unwrap_or_default();
        let key = progress.key.as_deref().unwrap_or_default();

        match result {
            Ok(_) => {
                span.record_outcome(true, extra);
                tracing::info!(
                    service.name = self.config.service_name.as_str(),
                    stage = stage.as_str(),
                    trace.id = trace_id.as_str(),
                    span.id = span_id.as_str(),
                    correlation.id = correlation_id,
                    bucket,
                    key,
                    "stage completed"
                );
            }
            Err(error) => {
                span.record_failure(error);
                span.record_outcome(false, extra);
                tracing::error!(
                    service.name = self.config.service_name.as_str(),
                    stage = stage.as_str(),
                    trace.id = trace_id.as_str(),
                    span.id = span_id.as_str(),
                    correlation.id = correlation_id,
                    bucket,
                    key,
                    error = %error,
                    "stage failed"
                );
            }
        }
        span.end();
    }
}

/// What a stage learned before it finished or failed, for the outcome event
/// and the log record.
#[derive(Debug, Clone, Default)]
struct Progress {
    bucket: Option<String>,
    key: Option<String>,
    correlation_id: Option<String>,
}

/// Per-invocation summary of a batch-triggered stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    /// Records never attempted because an earlier one failed under
    /// [`BatchPolicy::StopOnFirstFailure`].
    pub skipped: usize,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Runs `handle` over `records` in delivery order.
pub(crate) async fn run_batch<T, F, Fut>(policy: BatchPolicy, records: Vec<T>, mut handle: F) -> BatchReport
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), StageError>>,
{
    let total = records.len();
    let mut report = BatchReport::default();

    for record in records {
        match handle(record).await {
            Ok(()) => report.processed += 1,
            Err(_) => {
                report.failed += 1;
                if policy == BatchPolicy::StopOnFirstFailure {
                    report.skipped = total - report.processed - report.failed;
                    break;
                }
            }
        }
    }

    report
}

/// Runs one collaborator call inside its own child span, recording any
/// failure on that span before returning it.
pub(crate) async fn traced_call<T, Fut>(
    tracer: &dyn Tracer,
    parent: &SpanRecorder,
    name: &str,
    kind: SpanKind,
    attributes: Vec<KeyValue>,
    call: Fut,
) -> Result<T, StageError>
where
    Fut: Future<Output = Result<T, StageError>>,
{
    let stage = parent.stage().as_str();
    let bucket = attribute_text(&attributes, semconv::AWS_S3_BUCKET);
    let key = attribute_text(&attributes, semconv::AWS_S3_KEY);
    let mut span = parent.start_child(tracer, name, kind, attributes);
    let trace_id = span.context().trace_id_hex();
    tracing::debug!(
        stage,
        operation = name,
        trace.id = trace_id.as_str(),
        bucket = bucket.as_str(),
        key = key.as_str(),
        "calling"
    );

    let result = call.await;
    match &result {
        Ok(_) => {
            tracing::info!(
                stage,
                operation = name,
                trace.id = trace_id.as_str(),
                bucket = bucket.as_str(),
                key = key.as_str(),
                "succeeded"
            );
        }
        Err(error) => {
            span.record_failure(error);
            tracing::warn!(
                stage,
                operation = name,
                trace.id = trace_id.as_str(),
                bucket = bucket.as_str(),
                key = key.as_str(),
                error = %error,
                "failed"
            );
        }
    }
    span.end();
    result
}

fn attribute_text(attributes: &[KeyValue], key: &str) -> String {
    attributes
        .iter()
        .find(|attribute| attribute.key.as_str() == key)
        .map(|attribute| attribute.value.as_str().into_owned())
        .unwrap_or_default()
}

pub(crate) fn storage_attributes(bucket: &str, key: Option<&str>) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new(semconv::NET_TRANSPORT, semconv::NET_TRANSPORT_TCP),
        KeyValue::new(semconv::AWS_S3_BUCKET, bucket.to_string()),
    ];
    if let Some(key) = key {
        attributes.push(KeyValue::new(semconv::AWS_S3_KEY, key.to_string()));
    }
    attributes
}
