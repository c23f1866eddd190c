use lambda_runtime::{Context, Error};
use object_pipeline_core::contract::Stage;
use object_pipeline_core::ports::BlobStore;
use object_pipeline_core::stages::{CheckStage, StageContext};
use serde_json::{json, Value};

use crate::runtime::{batch_result, with_deadline};

pub async fn handle_check<S: BlobStore>(
    ctx: &StageContext<'_>,
    store: &S,
    invocation: &Context,
    payload: Value,
) -> Result<Value, Error> {
    let stage = CheckStage::new(ctx, store);
    let report = with_deadline(invocation, stage.handle_event(&payload)).await??;
    batch_result(Stage::Check, report)?;
    Ok(json!({ "status": "ok", "processed": report.processed }))
}

#[cfg(test)]
mod tests {
    use object_pipeline_core::config::BatchPolicy;
    use object_pipeline_core::fault::FaultInjector;
    use object_pipeline_core::test_helpers::{
        test_config, InMemoryBlobStore, RecordingTracer, TEST_OUTPUT_BUCKET,
    };

    use super::*;
    use crate::handlers::tests::invocation;

    fn delivery(bodies: &[&str]) -> Value {
        let records: Vec<Value> = bodies
            .iter()
            .map(|body| json!({"eventSource": "aws:sqs", "messageId": "m", "body": body}))
            .collect();
        json!({ "Records": records })
    }

    #[tokio::test]
    async fn checks_every_message() {
        let config = test_config();
        let tracer = RecordingTracer::new();
        let faults = FaultInjector::with_seed(1);
        let store = InMemoryBlobStore::with_buckets(&[TEST_OUTPUT_BUCKET]);
        store.insert(TEST_OUTPUT_BUCKET, "k1", r#"{"item":"x","isUpdated":true}"#);
        store.insert(TEST_OUTPUT_BUCKET, "k2", r#"{"item":"y","isUpdated":true}"#);
        let ctx = StageContext::new(&config, &tracer, &faults);

        let result = handle_check(
            &ctx,
            &store,
            &invocation(),
            delivery(&[r#"{"bucket":"out","key":"k1"}"#, r#"{"bucket":"out","key":"k2"}"#]),
        )
        .await
        .expect("batch should succeed");

        assert_eq!(result["processed"], json!(2));
    }

    #[tokio::test]
    async fn skipped_records_fail_the_invocation() {
        let mut config = test_config();
        config.batch_policy = BatchPolicy::StopOnFirstFailure;
        let tracer = RecordingTracer::new();
        let faults = FaultInjector::with_seed(1);
        let store = InMemoryBlobStore::with_buckets(&[TEST_OUTPUT_BUCKET]);
        let ctx = StageContext::new(&config, &tracer, &faults);

        let error = handle_check(
            &ctx,
            &store,
            &invocation(),
            delivery(&["{not json", r#"{"bucket":"out","key":"k2"}"#]),
        )
        .await
        .expect_err("decode failure should fail the invocation");

        assert!(error.to_string().contains("1 record(s) failed and 1 skipped"));
    }

    #[tokio::test]
    async fn undecodable_envelope_is_an_error() {
        let config = test_config();
        let tracer = RecordingTracer::new();
        let faults = FaultInjector::with_seed(1);
        let store = InMemoryBlobStore::with_buckets(&[TEST_OUTPUT_BUCKET]);
        let ctx = StageContext::new(&config, &tracer, &faults);

        let error = handle_check(&ctx, &store, &invocation(), json!({"detail": {}}))
            .await
            .expect_err("missing records should fail");

        assert!(error.to_string().contains("Records"));
    }
}
