use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contract::CORRELATION_ID_KEY;
use crate::error::StageError;

pub const FAILED_RESPONSE_BODY: &str = "Failed";

/// API Gateway proxy request. Only the fields the create stage reads.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HttpRequest {
    #[serde(rename = "httpMethod", default)]
    pub http_method: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "nullable_map")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn decode(event: Value) -> Result<Self, StageError> {
        if !event.is_object() {
            return Err(StageError::decode("Request payload must be a JSON object"));
        }
        serde_json::from_value(event)
            .map_err(|error| StageError::decode(format!("invalid http request: {error}")))
    }

    /// Header lookup ignoring ASCII case, as API Gateway does not normalise
    /// header names.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn route(&self) -> &str {
        self.resource
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or("/")
    }

    pub fn target(&self) -> &str {
        self.path.as_deref().unwrap_or("/")
    }
}

fn nullable_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            headers: json!({"Content-Type": "application/json"}),
            body: body.into(),
        }
    }

    /// Opaque failure; details go to the span and the log, never the caller.
    pub fn failed() -> Self {
        Self {
            status_code: 500,
            headers: json!({"Content-Type": "application/json"}),
            body: FAILED_RESPONSE_BODY.to_string(),
        }
    }
}

/// One object-created notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRecord {
    pub bucket: String,
    pub key: String,
    pub event_time: Option<String>,
}

/// Decoded notification. Each record decodes on its own so one malformed
/// record fails alone and the batch policy decides about the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub records: Vec<Result<StorageRecord, StageError>>,
}

impl StorageEvent {
    /// Fails only when the envelope has no `Records` array.
    pub fn decode(event: &Value) -> Result<Self, StageError> {
        let records = records_of(event, "S3")?;
        Ok(Self {
            records: records.iter().map(StorageRecord::decode).collect(),
        })
    }
}

impl StorageRecord {
    pub fn decode(record: &Value) -> Result<Self, StageError> {
        let bucket = record
            .pointer("/s3/bucket/name")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::decode("S3 record must include s3.bucket.name"))?;
        let key = record
            .pointer("/s3/object/key")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::decode("S3 record must include s3.object.key"))?;

        Ok(Self {
            bucket: bucket.to_string(),
            key: decode_object_key(key)?,
            event_time: record
                .get("eventTime")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// S3 notifications carry keys form-encoded: `+` for space, `%XX` escapes.
pub fn decode_object_key(raw: &str) -> Result<String, StageError> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' => {
                let escape = bytes
                    .get(index + 1..index + 3)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| StageError::decode(format!("invalid escape in object key '{raw}'")))?;
                decoded.push(escape);
                index += 2;
            }
            byte => decoded.push(byte),
        }
        index += 1;
    }

    String::from_utf8(decoded)
        .map_err(|_| StageError::decode(format!("object key '{raw}' is not valid UTF-8")))
}

/// One queue delivery. The body stays raw so a malformed body fails inside the
/// record's own span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub message_id: String,
    pub body: String,
    pub message_attributes: BTreeMap<String, String>,
}

impl QueueRecord {
    pub fn decode(record: &Value) -> Result<Self, StageError> {
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::decode("SQS record body must be a string"))?;
        let message_id = record
            .get("messageId")
            .and_then(Value::as_str)
            .unwrap_or_default();

        Ok(Self {
            message_id: message_id.to_string(),
            body: body.to_string(),
            message_attributes: string_attributes(record.get("messageAttributes")),
        })
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.message_attributes
            .get(CORRELATION_ID_KEY)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    pub records: Vec<Result<QueueRecord, StageError>>,
}

impl QueueEvent {
    pub fn decode(event: &Value) -> Result<Self, StageError> {
        let records = records_of(event, "SQS")?;
        Ok(Self {
            records: records.iter().map(QueueRecord::decode).collect(),
        })
    }
}

fn records_of<'a>(event: &'a Value, source: &str) -> Result<&'a Vec<Value>, StageError> {
    event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| StageError::decode(format!("{source} event must include Records array")))
}

/// Keeps only `stringValue` attributes; binary attributes are not used here.
fn string_attributes(attributes: Option<&Value>) -> BTreeMap<String, String> {
    attributes
        .and_then(Value::as_object)
        .map(|attributes| {
            attributes
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .get("stringValue")
                        .and_then(Value::as_str)
                        .map(|text| (name.clone(), text.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Scheduled invocation. The payload carries nothing the delete stage needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerTrigger {
    pub time: Option<String>,
}

impl TimerTrigger {
    pub fn decode(event: &Value) -> Self {
        Self {
            time: event.get("time").and_then(Value::as_str).map(str::to_string),
        }
    }
}
