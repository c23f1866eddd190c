use std::collections::BTreeMap;

use chrono::Utc;
use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use serde_json::Value;
use uuid::Uuid;

use crate::contract::{CreateRequest, CustomObject, Stage, CORRELATION_ID_KEY};
use crate::error::StageError;
use crate::ports::BlobStore;
use crate::stages::{storage_attributes, traced_call, Progress, StageContext};
use crate::telemetry::{semconv, SpanRecorder, TraceContext};
use crate::triggers::{HttpRequest, HttpResponse};

/// HTTP-triggered stage: writes a fresh object into the input bucket under a
/// millisecond-timestamp key.
pub struct CreateStage<'a, S> {
    ctx: &'a StageContext<'a>,
    store: &'a S,
}

impl<'a, S: BlobStore> CreateStage<'a, S> {
    pub fn new(ctx: &'a StageContext<'a>, store: &'a S) -> Self {
        Self { ctx, store }
    }

    /// Entry point for the raw proxy event.
    pub async fn handle_event(&self, event: Value) -> HttpResponse {
        match HttpRequest::decode(event) {
            Ok(request) => self.handle(&request).await,
            Err(error) => {
                let span = self.ctx.start_root_from(
                    Stage::Create,
                    &TraceContext::root(),
                    SpanKind::Server,
                    vec![KeyValue::new(semconv::FAAS_TRIGGER, semconv::FAAS_TRIGGER_HTTP)],
                );
                self.respond(span, &Progress::default(), Err(error))
            }
        }
    }

    pub async fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let mut span = self.ctx.start_root(Stage::Create, request);
        let mut progress = Progress::default();
        let result = self.create(&mut span, request, &mut progress).await;
        self.respond(span, &progress, result)
    }

    async fn create(
        &self,
        span: &mut SpanRecorder,
        request: &HttpRequest,
        progress: &mut Progress,
    ) -> Result<String, StageError> {
        let request = CreateRequest::parse(request.body.as_deref())?;
        let body = CustomObject::new(request.item()).to_json()?;

        let bucket = self.ctx.config.input_bucket()?;
        let key = Utc::now().timestamp_millis().to_string();
        let correlation_id = Uuid::new_v4().to_string();
        progress.bucket = Some(bucket.to_string());
        progress.key = Some(key.clone());
        progress.correlation_id = Some(correlation_id.clone());

        let target = self.ctx.fault_target(span, bucket);
        let metadata = BTreeMap::from([(CORRELATION_ID_KEY.to_string(), correlation_id)]);
        traced_call(
            self.ctx.tracer,
            span,
            semconv::S3_PUT_OBJECT,
            SpanKind::Client,
            storage_attributes(target, Some(&key)),
            self.store
                .put_object(target, &key, body.clone().into_bytes(), metadata),
        )
        .await?;

        Ok(body)
    }

    fn respond(
        &self,
        mut span: SpanRecorder,
        progress: &Progress,
        result: Result<String, StageError>,
    ) -> HttpResponse {
        let response = match &result {
            Ok(body) => HttpResponse::ok(body.clone()),
            Err(_) => HttpResponse::failed(),
        };
        span.set_attributes(vec![KeyValue::new(
            semconv::HTTP_STATUS_CODE,
            i64::from(response.status_code),
        )]);
        self.ctx.finish(span, progress, &result, Vec::new());
        response
    }
}
