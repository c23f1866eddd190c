mod support;

use object_pipeline_core::config::FaultRates;
use object_pipeline_core::contract::WRONG_BUCKET_NAME;
use object_pipeline_core::error::StageError;
use object_pipeline_core::stages::DeleteStage;
use object_pipeline_core::test_helpers::{StoreRequest, TEST_INPUT_BUCKET};
use opentelemetry::trace::SpanKind;
use opentelemetry::Value;
use support::events::scheduled;
use support::harness::{assert_all_spans_ended_once, Harness};

fn seed_objects(harness: &Harness, count: usize) {
    for index in 0..count {
        harness.store.insert(
            TEST_INPUT_BUCKET,
            &format!("17000000000{index:02}"),
            r#"{"item":"test","isUpdated":false,"isChecked":false}"#,
        );
    }
}

#[tokio::test]
async fn delete_empties_the_input_bucket() {
    let harness = Harness::new();
    seed_objects(&harness, 5);
    let ctx = harness.context();
    let stage = DeleteStage::new(&ctx, &harness.store);

    let deleted = stage
        .handle_event(&scheduled())
        .await
        .expect("delete should succeed");

    assert_eq!(deleted, 5);
    assert!(harness.store.keys(TEST_INPUT_BUCKET).is_empty());

    let root = harness.only_root_span();
    assert_eq!(root.kind, SpanKind::Server);
    assert_eq!(root.attribute("faas.trigger"), Some(&Value::from("timer")));
    let outcome = root.event("LambdaDeleteEvent").expect("outcome event");
    assert_eq!(outcome.attribute("is.successful"), Some(&Value::Bool(true)));
    assert_eq!(outcome.attribute("objects.deleted"), Some(&Value::I64(5)));
    assert_eq!(outcome.attribute("bucket.id"), Some(&Value::from("in")));
    assert_eq!(harness.children_of(&root)[0].name, "S3.DeleteObjects");
    assert_all_spans_ended_once(&harness.tracer);
}

#[tokio::test]
async fn delete_on_empty_bucket_reports_zero() {
    let harness = Harness::new();
    let ctx = harness.context();
    let stage = DeleteStage::new(&ctx, &harness.store);

    let deleted = stage
        .handle_event(&scheduled())
        .await
        .expect("delete should succeed");

    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn injected_fault_leaves_bucket_intact_and_records_error() {
    let harness = Harness::new().with_faults(FaultRates {
        delete: 1,
        ..FaultRates::disabled()
    });
    seed_objects(&harness, 3);
    let ctx = harness.context();
    let stage = DeleteStage::new(&ctx, &harness.store);

    let error = stage
        .handle_event(&scheduled())
        .await
        .expect_err("fault should fail the delete");

    assert!(matches!(error, StageError::Storage(_)));
    assert_eq!(harness.store.keys(TEST_INPUT_BUCKET).len(), 3);
    assert_eq!(
        harness.store.requests(),
        vec![StoreRequest::DeleteAll {
            bucket: WRONG_BUCKET_NAME.to_string(),
        }]
    );

    let root = harness.only_root_span();
    assert_eq!(root.status_description.as_deref(), Some("Delete Lambda is failed."));
    let outcome = root.event("LambdaDeleteEvent").expect("outcome event");
    assert_eq!(outcome.attribute("is.successful"), Some(&Value::Bool(false)));
    assert_eq!(outcome.attribute("objects.deleted"), None);
    assert_all_spans_ended_once(&harness.tracer);
}

#[tokio::test]
async fn partial_bulk_delete_failure_names_the_surviving_keys() {
    let harness = Harness::new();
    seed_objects(&harness, 3);
    harness.store.refuse_delete(TEST_INPUT_BUCKET, "1700000000001");
    let ctx = harness.context();
    let stage = DeleteStage::new(&ctx, &harness.store);

    let error = stage
        .handle_event(&scheduled())
        .await
        .expect_err("partial failure should surface");

    assert!(error.to_string().contains("1700000000001"));
    assert_eq!(harness.store.keys(TEST_INPUT_BUCKET), vec!["1700000000001"]);
    assert!(harness.only_root_span().is_error());
}
