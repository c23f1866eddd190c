use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use serde_json::Value;

use crate::contract::Stage;
use crate::error::StageError;
use crate::ports::BlobStore;
use crate::stages::{storage_attributes, traced_call, Progress, StageContext};
use crate::telemetry::{semconv, SpanRecorder};
use crate::triggers::TimerTrigger;

/// Timer-triggered stage: purges every object from the input bucket.
pub struct DeleteStage<'a, S> {
    ctx: &'a StageContext<'a>,
    store: &'a S,
}

impl<'a, S: BlobStore> DeleteStage<'a, S> {
    pub fn new(ctx: &'a StageContext<'a>, store: &'a S) -> Self {
        Self { ctx, store }
    }

    pub async fn handle_event(&self, event: &Value) -> Result<usize, StageError> {
        self.handle(&TimerTrigger::decode(event)).await
    }

    /// Returns how many objects were removed.
    pub async fn handle(&self, trigger: &TimerTrigger) -> Result<usize, StageError> {
        let mut span = self.ctx.start_root(Stage::Delete, trigger);
        let mut progress = Progress::default();
        let result = self.delete(&mut span, &mut progress).await;

        let extra = match &result {
            Ok(deleted) => vec![KeyValue::new(semconv::OBJECTS_DELETED, *deleted as i64)],
            Err(_) => Vec::new(),
        };
        self.ctx.finish(span, &progress, &result, extra);
        result
    }

    async fn delete(&self, span: &mut SpanRecorder, progress: &mut Progress) -> Result<usize, StageError> {
        let bucket = self.ctx.config.input_bucket()?;
        progress.bucket = Some(bucket.to_string());

        let target = self.ctx.fault_target(span, bucket);
        traced_call(
            self.ctx.tracer,
            span,
            semconv::S3_DELETE_OBJECTS,
            SpanKind::Client,
            storage_attributes(target, None),
            self.store.delete_all_objects(target),
        )
        .await
    }
}
