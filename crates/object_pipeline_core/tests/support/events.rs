#![allow(dead_code)]

use serde_json::{json, Value};

/// API Gateway proxy event for `POST /create`.
pub fn create_request(body: Option<&str>, headers: &[(&str, &str)]) -> Value {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| (name.to_string(), json!(value)))
        .collect();
    json!({
        "httpMethod": "POST",
        "resource": "/create",
        "path": "/create",
        "headers": headers,
        "body": body,
    })
}

/// S3 `ObjectCreated:Put` notification with one record per key.
pub fn object_created(bucket: &str, keys: &[&str]) -> Value {
    let records: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "eventTime": "2026-03-01T12:00:00.000Z",
                "s3": {
                    "bucket": {"name": bucket},
                    "object": {"key": key}
                }
            })
        })
        .collect();
    json!({ "Records": records })
}

/// SQS delivery with one record per body.
pub fn queue_delivery(bodies: &[&str]) -> Value {
    let records: Vec<Value> = bodies
        .iter()
        .enumerate()
        .map(|(index, body)| {
            json!({
                "eventSource": "aws:sqs",
                "messageId": format!("message-{index}"),
                "body": body,
                "messageAttributes": {}
            })
        })
        .collect();
    json!({ "Records": records })
}

pub fn queue_delivery_with_correlation(body: &str, correlation_id: &str) -> Value {
    json!({
        "Records": [{
            "eventSource": "aws:sqs",
            "messageId": "message-0",
            "body": body,
            "messageAttributes": {
                "correlation-id": {"stringValue": correlation_id, "dataType": "String"}
            }
        }]
    })
}

/// EventBridge scheduled event.
pub fn scheduled() -> Value {
    json!({
        "source": "aws.events",
        "detail-type": "Scheduled Event",
        "time": "2026-03-01T00:00:00Z",
        "detail": {}
    })
}
