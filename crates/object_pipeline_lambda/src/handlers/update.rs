use lambda_runtime::{Context, Error};
use object_pipeline_core::contract::Stage;
use object_pipeline_core::ports::{BlobStore, MessageQueue};
use object_pipeline_core::stages::{StageContext, UpdateStage};
use serde_json::{json, Value};

use crate::runtime::{batch_result, with_deadline};

pub async fn handle_update<S: BlobStore, Q: MessageQueue>(
    ctx: &StageContext<'_>,
    store: &S,
    queue: &Q,
    invocation: &Context,
    payload: Value,
) -> Result<Value, Error> {
    let stage = UpdateStage::new(ctx, store, queue);
    let report = with_deadline(invocation, stage.handle_event(&payload)).await??;
    batch_result(Stage::Update, report)?;
    Ok(json!({ "status": "ok", "processed": report.processed }))
}

#[cfg(test)]
mod tests {
    use object_pipeline_core::fault::FaultInjector;
    use object_pipeline_core::test_helpers::{
        test_config, InMemoryBlobStore, RecordingQueue, RecordingTracer, TEST_INPUT_BUCKET,
        TEST_OUTPUT_BUCKET,
    };

    use super::*;
    use crate::handlers::tests::invocation;

    fn object_created(keys: &[&str]) -> Value {
        let records: Vec<Value> = keys
            .iter()
            .map(|key| json!({"s3": {"bucket": {"name": "in"}, "object": {"key": key}}}))
            .collect();
        json!({ "Records": records })
    }

    #[tokio::test]
    async fn clean_batch_succeeds() {
        let config = test_config();
        let tracer = RecordingTracer::new();
        let faults = FaultInjector::with_seed(1);
        let store = InMemoryBlobStore::with_buckets(&[TEST_INPUT_BUCKET, TEST_OUTPUT_BUCKET]);
        store.insert(TEST_INPUT_BUCKET, "k1", r#"{"item":"x"}"#);
        let queue = RecordingQueue::new();
        let ctx = StageContext::new(&config, &tracer, &faults);

        let result = handle_update(&ctx, &store, &queue, &invocation(), object_created(&["k1"]))
            .await
            .expect("batch should succeed");

        assert_eq!(result["processed"], json!(1));
        assert_eq!(queue.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_record_fails_the_invocation_for_redelivery() {
        let config = test_config();
        let tracer = RecordingTracer::new();
        let faults = FaultInjector::with_seed(1);
        let store = InMemoryBlobStore::with_buckets(&[TEST_INPUT_BUCKET, TEST_OUTPUT_BUCKET]);
        let queue = RecordingQueue::new();
        let ctx = StageContext::new(&config, &tracer, &faults);

        let error = handle_update(&ctx, &store, &queue, &invocation(), object_created(&["gone"]))
            .await
            .expect_err("missing object should fail");

        assert!(error.to_string().contains("1 record(s) failed"));
    }
}
