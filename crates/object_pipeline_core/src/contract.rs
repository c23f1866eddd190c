use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// Bucket name substituted for the real destination when a fault is injected.
pub const WRONG_BUCKET_NAME: &str = "wrong-bucket-name";
/// Object metadata key and queue message attribute carrying the correlation id.
pub const CORRELATION_ID_KEY: &str = "correlation-id";
/// Message group id used for the FIFO notification queue.
pub const SQS_MESSAGE_GROUP_ID: &str = "otel";
/// Item assigned to freshly created objects when the request does not name one.
pub const DEFAULT_ITEM: &str = "test";
/// Name of every stage's root span.
pub const HANDLER_SPAN_NAME: &str = "main.handler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Create,
    Update,
    Check,
    Delete,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Check => "check",
            Self::Delete => "delete",
        }
    }

    /// Name of the outcome event appended to the stage's root span.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Create => "LambdaCreateEvent",
            Self::Update => "LambdaUpdateEvent",
            Self::Check => "LambdaCheckEvent",
            Self::Delete => "LambdaDeleteEvent",
        }
    }

    /// Status description set on every span that fails within the stage.
    pub fn error_description(self) -> &'static str {
        match self {
            Self::Create => "Create Lambda is failed.",
            Self::Update => "Update Lambda is failed.",
            Self::Check => "Check Lambda is failed.",
            Self::Delete => "Delete Lambda is failed.",
        }
    }
}

/// The record flowing through the pipeline.
///
/// Both flags are monotonic: once set they are never cleared, so replaying a
/// stage on an already processed object yields the same object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomObject {
    pub item: String,
    #[serde(rename = "isUpdated", default)]
    pub is_updated: bool,
    #[serde(rename = "isChecked", default)]
    pub is_checked: bool,
}

impl CustomObject {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            is_updated: false,
            is_checked: false,
        }
    }

    pub fn decode(body: &[u8]) -> Result<Self, StageError> {
        serde_json::from_slice(body)
            .map_err(|error| StageError::decode(format!("invalid custom object: {error}")))
    }

    pub fn to_json(&self) -> Result<String, StageError> {
        serde_json::to_string(self)
            .map_err(|error| StageError::decode(format!("failed to encode custom object: {error}")))
    }

    pub fn encode(&self) -> Result<Vec<u8>, StageError> {
        self.to_json().map(String::into_bytes)
    }
}

/// Decodes a stored object and marks it as updated.
pub fn update_custom_object(body: &[u8]) -> Result<CustomObject, StageError> {
    let mut object = CustomObject::decode(body)?;
    object.is_updated = true;
    Ok(object)
}

/// Decodes a stored object and marks it as checked.
pub fn check_custom_object(body: &[u8]) -> Result<CustomObject, StageError> {
    let mut object = CustomObject::decode(body)?;
    object.is_checked = true;
    Ok(object)
}

/// Queue message body naming where the next stage finds its object.
///
/// `traceparent`/`tracestate` carry the sender's trace context; they are
/// optional and only needed for trace continuity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracestate: Option<String>,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            traceparent: None,
            tracestate: None,
        }
    }

    pub fn decode(body: &str) -> Result<Self, StageError> {
        serde_json::from_str(body)
            .map_err(|error| StageError::decode(format!("invalid queue message body: {error}")))
    }

    pub fn to_json(&self) -> Result<String, StageError> {
        serde_json::to_string(self)
            .map_err(|error| StageError::decode(format!("failed to encode queue message: {error}")))
    }
}

/// Optional JSON body accepted by the create endpoint.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CreateRequest {
    #[serde(default)]
    pub item: Option<String>,
}

impl CreateRequest {
    /// An absent or blank body is an empty request; anything else must be a
    /// JSON object.
    pub fn parse(body: Option<&str>) -> Result<Self, StageError> {
        match body.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(text) => serde_json::from_str(text)
                .map_err(|error| StageError::decode(format!("Malformed JSON body: {error}"))),
        }
    }

    pub fn item(&self) -> &str {
        self.item
            .as_deref()
            .filter(|item| !item.trim().is_empty())
            .unwrap_or(DEFAULT_ITEM)
    }
}
