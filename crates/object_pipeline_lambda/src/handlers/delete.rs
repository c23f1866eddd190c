use lambda_runtime::{Context, Error};
use object_pipeline_core::ports::BlobStore;
use object_pipeline_core::stages::{DeleteStage, StageContext};
use serde_json::{json, Value};

use crate::runtime::with_deadline;

pub async fn handle_delete<S: BlobStore>(
    ctx: &StageContext<'_>,
    store: &S,
    invocation: &Context,
    payload: Value,
) -> Result<Value, Error> {
    let stage = DeleteStage::new(ctx, store);
    let deleted = with_deadline(invocation, stage.handle_event(&payload)).await??;
    Ok(json!({ "status": "ok", "deleted": deleted }))
}

#[cfg(test)]
mod tests {
    use object_pipeline_core::config::FaultRates;
    use object_pipeline_core::fault::FaultInjector;
    use object_pipeline_core::test_helpers::{
        test_config, InMemoryBlobStore, RecordingTracer, TEST_INPUT_BUCKET,
    };

    use super::*;
    use crate::handlers::tests::invocation;

    #[tokio::test]
    async fn reports_deleted_count() {
        let config = test_config();
        let tracer = RecordingTracer::new();
        let faults = FaultInjector::with_seed(1);
        let store = InMemoryBlobStore::with_buckets(&[TEST_INPUT_BUCKET]);
        store.insert(TEST_INPUT_BUCKET, "1", "{}");
        store.insert(TEST_INPUT_BUCKET, "2", "{}");
        let ctx = StageContext::new(&config, &tracer, &faults);

        let result = handle_delete(&ctx, &store, &invocation(), json!({"source": "aws.events"}))
            .await
            .expect("delete should succeed");

        assert_eq!(result["deleted"], json!(2));
    }

    #[tokio::test]
    async fn injected_fault_fails_the_invocation() {
        let mut config = test_config();
        config.fault_rates = FaultRates::uniform(1);
        let tracer = RecordingTracer::new();
        let faults = FaultInjector::with_seed(1);
        let store = InMemoryBlobStore::with_buckets(&[TEST_INPUT_BUCKET]);
        store.insert(TEST_INPUT_BUCKET, "1", "{}");
        let ctx = StageContext::new(&config, &tracer, &faults);

        let error = handle_delete(&ctx, &store, &invocation(), json!({}))
            .await
            .expect_err("fault should fail the delete");

        assert!(error.to_string().contains("NoSuchBucket"));
        assert_eq!(store.keys(TEST_INPUT_BUCKET), vec!["1"]);
    }
}
