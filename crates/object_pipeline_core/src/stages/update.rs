use std::collections::BTreeMap;

use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use serde_json::Value;

use crate::contract::{
    update_custom_object, ObjectLocation, Stage, CORRELATION_ID_KEY, SQS_MESSAGE_GROUP_ID,
};
use crate::error::StageError;
use crate::ports::{BlobStore, MessageQueue, OutboundMessage};
use crate::stages::{
    run_batch, storage_attributes, traced_call, BatchReport, Progress, StageContext,
};
use crate::telemetry::carrier::inject_into_location;
use crate::telemetry::{semconv, SpanRecorder};
use crate::triggers::{StorageEvent, StorageRecord};

/// Storage-event stage: marks each new input object as updated, writes it to
/// the output bucket under the same key and notifies the check stage.
pub struct UpdateStage<'a, S, Q> {
    ctx: &'a StageContext<'a>,
    store: &'a S,
    queue: &'a Q,
}

impl<'a, S: BlobStore, Q: MessageQueue> UpdateStage<'a, S, Q> {
    pub fn new(ctx: &'a StageContext<'a>, store: &'a S, queue: &'a Q) -> Self {
        Self { ctx, store, queue }
    }

    /// Decodes the notification envelope and processes its records. An
    /// undecodable envelope is recorded on its own root span.
    pub async fn handle_event(&self, event: &Value) -> Result<BatchReport, StageError> {
        match StorageEvent::decode(event) {
            Ok(event) => Ok(self.handle(event).await),
            Err(error) => Err(self.ctx.reject(
                Stage::Update,
                SpanKind::Consumer,
                semconv::FAAS_TRIGGER_DATASOURCE,
                error,
            )),
        }
    }

    pub async fn handle(&self, event: StorageEvent) -> BatchReport {
        run_batch(self.ctx.config.batch_policy, event.records, |record| async move {
            match record {
                Ok(record) => self.handle_record(record).await,
                Err(error) => Err(self.ctx.reject(
                    Stage::Update,
                    SpanKind::Consumer,
                    semconv::FAAS_TRIGGER_DATASOURCE,
                    error,
                )),
            }
        })
        .await
    }

    /// Processes one record inside its own root span.
    pub async fn handle_record(&self, record: StorageRecord) -> Result<(), StageError> {
        let mut span = self.ctx.start_root(Stage::Update, &record);
        let mut progress = Progress {
            key: Some(record.key.clone()),
            ..Progress::default()
        };
        let result = self.update(&mut span, &record, &mut progress).await;
        self.ctx.finish(span, &progress, &result, Vec::new());
        result
    }

    async fn update(
        &self,
        span: &mut SpanRecorder,
        record: &StorageRecord,
        progress: &mut Progress,
    ) -> Result<(), StageError> {
        let output_bucket = self.ctx.config.output_bucket()?;
        let queue_url = self.ctx.config.queue_url()?;

        let source = traced_call(
            self.ctx.tracer,
            span,
            semconv::S3_GET_OBJECT,
            SpanKind::Client,
            storage_attributes(&record.bucket, Some(&record.key)),
            self.store.get_object(&record.bucket, &record.key),
        )
        .await?;
        let correlation_id = source.metadata.get(CORRELATION_ID_KEY).cloned();
        progress.correlation_id = correlation_id.clone();

        let body = update_custom_object(&source.body)?.encode()?;
        progress.bucket = Some(output_bucket.to_string());

        let target = self.ctx.fault_target(span, output_bucket);
        traced_call(
            self.ctx.tracer,
            span,
            semconv::S3_PUT_OBJECT,
            SpanKind::Client,
            storage_attributes(target, Some(&record.key)),
            self.store
                .put_object(target, &record.key, body, source.metadata.clone()),
        )
        .await?;

        self.notify(span, queue_url, output_bucket, &record.key, correlation_id)
            .await
    }

    /// Sends the location of the updated object to the check stage. The
    /// producer span's context rides in the body so the check stage continues
    /// this trace.
    async fn notify(
        &self,
        span: &SpanRecorder,
        queue_url: &str,
        bucket: &str,
        key: &str,
        correlation_id: Option<String>,
    ) -> Result<(), StageError> {
        let mut send_span = span.start_child(
            self.ctx.tracer,
            semconv::SQS_SEND_MESSAGE,
            SpanKind::Producer,
            vec![
                KeyValue::new(semconv::MESSAGING_SYSTEM, semconv::MESSAGING_SYSTEM_SQS),
                KeyValue::new(semconv::MESSAGING_OPERATION, semconv::MESSAGING_OPERATION_PUBLISH),
                KeyValue::new(
                    semconv::MESSAGING_DESTINATION_KIND,
                    semconv::MESSAGING_DESTINATION_KIND_QUEUE,
                ),
                KeyValue::new(
                    semconv::MESSAGING_DESTINATION_NAME,
                    self.ctx.config.queue_name().to_string(),
                ),
                KeyValue::new(semconv::AWS_QUEUE_URL, queue_url.to_string()),
            ],
        );

        let mut location = ObjectLocation::new(bucket, key);
        inject_into_location(&mut location, &send_span.context());
        let body = match location.to_json() {
            Ok(body) => body,
            Err(error) => {
                send_span.record_failure(&error);
                send_span.end();
                return Err(error);
            }
        };

        let attributes: BTreeMap<String, String> = correlation_id
            .map(|id| (CORRELATION_ID_KEY.to_string(), id))
            .into_iter()
            .collect();
        let message = OutboundMessage {
            queue_url: queue_url.to_string(),
            body,
            group_id: SQS_MESSAGE_GROUP_ID.to_string(),
            attributes,
        };

        match self.queue.send(message).await {
            Ok(message_id) => {
                send_span.set_attributes(vec![KeyValue::new(
                    semconv::MESSAGING_MESSAGE_ID,
                    message_id,
                )]);
                send_span.end();
                Ok(())
            }
            Err(error) => {
                send_span.record_failure(&error);
                send_span.end();
                Err(error)
            }
        }
    }
}
