use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use serde_json::Value;

use crate::contract::{check_custom_object, ObjectLocation, Stage, CORRELATION_ID_KEY};
use crate::error::StageError;
use crate::ports::BlobStore;
use crate::stages::{
    run_batch, storage_attributes, traced_call, BatchReport, Progress, StageContext,
};
use crate::telemetry::{semconv, SpanRecorder};
use crate::triggers::{QueueEvent, QueueRecord};

/// Queue-triggered stage: marks the object named by each message as checked
/// and writes it back in place.
pub struct CheckStage<'a, S> {
    ctx: &'a StageContext<'a>,
    store: &'a S,
}

impl<'a, S: BlobStore> CheckStage<'a, S> {
    pub fn new(ctx: &'a StageContext<'a>, store: &'a S) -> Self {
        Self { ctx, store }
    }

    pub async fn handle_event(&self, event: &Value) -> Result<BatchReport, StageError> {
        match QueueEvent::decode(event) {
            Ok(event) => Ok(self.handle(event).await),
            Err(error) => Err(self.ctx.reject(
                Stage::Check,
                SpanKind::Consumer,
                semconv::FAAS_TRIGGER_PUBSUB,
                error,
            )),
        }
    }

    pub async fn handle(&self, event: QueueEvent) -> BatchReport {
        run_batch(self.ctx.config.batch_policy, event.records, |record| async move {
            match record {
                Ok(record) => self.handle_record(record).await,
                Err(error) => Err(self.ctx.reject(
                    Stage::Check,
                    SpanKind::Consumer,
                    semconv::FAAS_TRIGGER_PUBSUB,
                    error,
                )),
            }
        })
        .await
    }

    /// Processes one message inside its own root span, continuing the trace
    /// named in the message body when there is one.
    pub async fn handle_record(&self, record: QueueRecord) -> Result<(), StageError> {
        let mut span = self.ctx.start_root(Stage::Check, &record);
        let mut progress = Progress {
            correlation_id: record.correlation_id().map(str::to_string),
            ..Progress::default()
        };
        let result = self.check(&mut span, &record, &mut progress).await;
        self.ctx.finish(span, &progress, &result, Vec::new());
        result
    }

    async fn check(
        &self,
        span: &mut SpanRecorder,
        record: &QueueRecord,
        progress: &mut Progress,
    ) -> Result<(), StageError> {
        let location = ObjectLocation::decode(&record.body)?;
        progress.bucket = Some(location.bucket.clone());
        progress.key = Some(location.key.clone());

        let source = traced_call(
            self.ctx.tracer,
            span,
            semconv::S3_GET_OBJECT,
            SpanKind::Client,
            storage_attributes(&location.bucket, Some(&location.key)),
            self.store.get_object(&location.bucket, &location.key),
        )
        .await?;
        if progress.correlation_id.is_none() {
            progress.correlation_id = source.metadata.get(CORRELATION_ID_KEY).cloned();
        }

        let object = check_custom_object(&source.body)?;
        if !object.is_updated {
            // Processed anyway; stage ordering is not enforced.
            span.set_attributes(vec![KeyValue::new(semconv::OBJECT_OUT_OF_ORDER, true)]);
            tracing::warn!(
                stage = Stage::Check.as_str(),
                bucket = location.bucket.as_str(),
                key = location.key.as_str(),
                "checking an object that was never updated"
            );
        }
        let body = object.encode()?;

        let target = self.ctx.fault_target(span, &location.bucket);
        traced_call(
            self.ctx.tracer,
            span,
            semconv::S3_PUT_OBJECT,
            SpanKind::Client,
            storage_attributes(target, Some(&location.key)),
            self.store
                .put_object(target, &location.key, body, source.metadata),
        )
        .await
    }
}
