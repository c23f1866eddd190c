use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use opentelemetry::trace::{SpanContext, SpanId, SpanKind, TraceFlags, TraceId, TraceState};
use opentelemetry::{KeyValue, Value};

use crate::config::{FaultRates, PipelineConfig};
use crate::error::StageError;
use crate::ports::{BlobStore, MessageQueue, OutboundMessage, StoredObject};
use crate::telemetry::{SpanHandle, TraceContext, Tracer};

pub const TEST_INPUT_BUCKET: &str = "in";
pub const TEST_OUTPUT_BUCKET: &str = "out";
pub const TEST_QUEUE_URL: &str = "https://sqs.eu-west-1.amazonaws.com/000000000000/objects.fifo";

/// Configuration naming the test buckets and queue, with fault injection
/// disabled so outcomes are deterministic.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        service_name: "object-pipeline-test".to_string(),
        input_bucket: Some(TEST_INPUT_BUCKET.to_string()),
        output_bucket: Some(TEST_OUTPUT_BUCKET.to_string()),
        queue_url: Some(TEST_QUEUE_URL.to_string()),
        queue_name: None,
        fault_rates: FaultRates::disabled(),
        ..PipelineConfig::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRequest {
    Get { bucket: String, key: String },
    Put { bucket: String, key: String },
    DeleteAll { bucket: String },
}

/// Object store holding only the buckets it was created with; any other
/// bucket fails the way S3 does.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    undeletable: Mutex<BTreeSet<(String, String)>>,
    requests: Mutex<Vec<StoreRequest>>,
}

impl InMemoryBlobStore {
    pub fn with_buckets(names: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut buckets = store.buckets.lock().expect("poisoned mutex");
            for name in names {
                buckets.insert(name.to_string(), BTreeMap::new());
            }
        }
        store
    }

    /// # Panics
    ///
    /// Panics if `bucket` was not created.
    pub fn insert(&self, bucket: &str, key: &str, body: &str) {
        self.insert_with_metadata(bucket, key, body, BTreeMap::new());
    }

    pub fn insert_with_metadata(
        &self,
        bucket: &str,
        key: &str,
        body: &str,
        metadata: BTreeMap<String, String>,
    ) {
        self.buckets
            .lock()
            .expect("poisoned mutex")
            .get_mut(bucket)
            .expect("bucket should exist")
            .insert(
                key.to_string(),
                StoredObject {
                    body: body.as_bytes().to_vec(),
                    metadata,
                },
            );
    }

    /// Makes the bulk delete report `key` as a per-key failure.
    pub fn refuse_delete(&self, bucket: &str, key: &str) {
        self.undeletable
            .lock()
            .expect("poisoned mutex")
            .insert((bucket.to_string(), key.to_string()));
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets
            .lock()
            .expect("poisoned mutex")
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn body(&self, bucket: &str, key: &str) -> Option<String> {
        self.object(bucket, key)
            .map(|object| String::from_utf8_lossy(&object.body).into_owned())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .expect("poisoned mutex")
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<StoreRequest> {
        self.requests.lock().expect("poisoned mutex").clone()
    }

    fn record(&self, request: StoreRequest) {
        self.requests.lock().expect("poisoned mutex").push(request);
    }
}

fn no_such_bucket(bucket: &str) -> StageError {
    StageError::storage(format!("NoSuchBucket: The specified bucket does not exist ({bucket})"))
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StageError> {
        self.record(StoreRequest::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        let buckets = self.buckets.lock().expect("poisoned mutex");
        let objects = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        objects.get(key).cloned().ok_or_else(|| {
            StageError::storage(format!("NoSuchKey: The specified key does not exist ({key})"))
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), StageError> {
        self.record(StoreRequest::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        let mut buckets = self.buckets.lock().expect("poisoned mutex");
        let objects = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        objects.insert(key.to_string(), StoredObject { body, metadata });
        Ok(())
    }

    async fn delete_all_objects(&self, bucket: &str) -> Result<usize, StageError> {
        self.record(StoreRequest::DeleteAll {
            bucket: bucket.to_string(),
        });
        let undeletable = self.undeletable.lock().expect("poisoned mutex").clone();
        let mut buckets = self.buckets.lock().expect("poisoned mutex");
        let objects = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;

        let before = objects.len();
        objects.retain(|key, _| undeletable.contains(&(bucket.to_string(), key.clone())));
        let failed: Vec<_> = objects.keys().cloned().collect();
        if failed.is_empty() {
            Ok(before)
        } else {
            Err(StageError::storage(format!(
                "failed to delete {} object(s): {}",
                failed.len(),
                failed.join(", ")
            )))
        }
    }
}

/// Queue that keeps every sent message, or rejects all of them.
#[derive(Debug, Default)]
pub struct RecordingQueue {
    messages: Mutex<Vec<OutboundMessage>>,
    reject: bool,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().expect("poisoned mutex").clone()
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn send(&self, message: OutboundMessage) -> Result<String, StageError> {
        if self.reject {
            return Err(StageError::queue(format!(
                "AWS.SimpleQueueService.NonExistentQueue ({})",
                message.queue_url
            )));
        }
        let mut messages = self.messages.lock().expect("poisoned mutex");
        messages.push(message);
        Ok(format!("msg-{}", messages.len()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub name: String,
    pub attributes: Vec<KeyValue>,
}

impl RecordedEvent {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        find_attribute(&self.attributes, key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSpan {
    pub name: String,
    pub kind: SpanKind,
    pub parent: TraceContext,
    pub context: TraceContext,
    pub attributes: Vec<KeyValue>,
    pub events: Vec<RecordedEvent>,
    pub status_description: Option<String>,
    pub end_count: usize,
}

impl RecordedSpan {
    /// Latest value written for `key`.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        find_attribute(&self.attributes, key)
    }

    pub fn event(&self, name: &str) -> Option<&RecordedEvent> {
        self.events.iter().find(|event| event.name == name)
    }

    pub fn is_error(&self) -> bool {
        self.status_description.is_some()
    }
}

fn find_attribute<'a>(attributes: &'a [KeyValue], key: &str) -> Option<&'a Value> {
    attributes
        .iter()
        .rev()
        .find(|attribute| attribute.key.as_str() == key)
        .map(|attribute| &attribute.value)
}

/// Tracer that keeps every span in memory, in start order.
///
/// Ids are sequential, so traces and spans are distinct but predictable.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
    next_id: AtomicU64,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.lock().expect("poisoned mutex").clone()
    }

    pub fn spans_named(&self, name: &str) -> Vec<RecordedSpan> {
        self.spans()
            .into_iter()
            .filter(|span| span.name == name)
            .collect()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Tracer for RecordingTracer {
    fn start_span(
        &self,
        parent: &TraceContext,
        name: &str,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> Box<dyn SpanHandle> {
        let trace_id = if parent.is_valid() {
            parent.span_context().trace_id()
        } else {
            TraceId::from_bytes(u128::from(self.next_id()).to_be_bytes())
        };
        let context = TraceContext::from_span_context(SpanContext::new(
            trace_id,
            SpanId::from_bytes(self.next_id().to_be_bytes()),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        ));

        let mut spans = self.spans.lock().expect("poisoned mutex");
        spans.push(RecordedSpan {
            name: name.to_string(),
            kind,
            parent: parent.clone(),
            context: context.clone(),
            attributes,
            events: Vec::new(),
            status_description: None,
            end_count: 0,
        });

        Box::new(RecordingSpan {
            index: spans.len() - 1,
            context,
            spans: Arc::clone(&self.spans),
        })
    }
}

struct RecordingSpan {
    index: usize,
    context: TraceContext,
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
}

impl RecordingSpan {
    fn update(&self, apply: impl FnOnce(&mut RecordedSpan)) {
        let mut spans = self.spans.lock().expect("poisoned mutex");
        apply(&mut spans[self.index]);
    }
}

impl SpanHandle for RecordingSpan {
    fn context(&self) -> TraceContext {
        self.context.clone()
    }

    fn set_attributes(&mut self, attributes: Vec<KeyValue>) {
        self.update(|span| span.attributes.extend(attributes));
    }

    fn add_event(&mut self, name: &str, attributes: Vec<KeyValue>) {
        self.update(|span| {
            span.events.push(RecordedEvent {
                name: name.to_string(),
                attributes,
            })
        });
    }

    fn set_error(&mut self, description: &str) {
        self.update(|span| span.status_description = Some(description.to_string()));
    }

    fn end(&mut self) {
        self.update(|span| span.end_count += 1);
    }
}
