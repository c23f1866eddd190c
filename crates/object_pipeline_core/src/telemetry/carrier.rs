//! Moves a [`TraceContext`] in and out of each transport's envelope.
//!
//! HTTP requests carry `traceparent`/`tracestate` headers. Queue messages have
//! no usable out-of-band channel, so the same two fields ride inside the JSON
//! body. Storage notifications and timers carry nothing and always start a new
//! trace.

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::SpanKind;
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use serde_json::{Map, Value};

use crate::contract::ObjectLocation;
use crate::telemetry::semconv;
use crate::telemetry::span::TraceContext;
use crate::triggers::{HttpRequest, QueueRecord, StorageRecord, TimerTrigger};

const TRACEPARENT: &str = "traceparent";
const TRACESTATE: &str = "tracestate";

/// Per-transport view of an inbound trigger: where its parent trace context
/// comes from and how its root span is described.
pub trait TraceCarrier {
    fn parent_context(&self) -> TraceContext;
    fn span_kind(&self) -> SpanKind;
    fn root_attributes(&self) -> Vec<KeyValue>;
}

impl TraceCarrier for HttpRequest {
    fn parent_context(&self) -> TraceContext {
        extract(&HeaderExtractor(self))
    }

    fn span_kind(&self) -> SpanKind {
        SpanKind::Server
    }

    fn root_attributes(&self) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new(semconv::FAAS_TRIGGER, semconv::FAAS_TRIGGER_HTTP),
            KeyValue::new(semconv::NET_TRANSPORT, semconv::NET_TRANSPORT_TCP),
            KeyValue::new(semconv::HTTP_METHOD, self.http_method.clone()),
            KeyValue::new(semconv::HTTP_ROUTE, self.route().to_string()),
            KeyValue::new(semconv::HTTP_TARGET, self.target().to_string()),
        ];
        if let Some(scheme) = self.header("X-Forwarded-Proto") {
            attributes.push(KeyValue::new(semconv::HTTP_SCHEME, scheme.to_string()));
        }
        if let Some(user_agent) = self.header("User-Agent") {
            attributes.push(KeyValue::new(semconv::HTTP_USER_AGENT, user_agent.to_string()));
        }
        if let Some(host) = self.header("Host") {
            attributes.push(KeyValue::new(semconv::NET_HOST_NAME, host.to_string()));
        }
        attributes
    }
}

impl TraceCarrier for QueueRecord {
    /// A body that is not a JSON object simply has no parent; the stage
    /// reports the decode failure itself.
    fn parent_context(&self) -> TraceContext {
        match serde_json::from_str::<Value>(&self.body) {
            Ok(Value::Object(fields)) => extract(&BodyExtractor(&fields)),
            _ => TraceContext::root(),
        }
    }

    fn span_kind(&self) -> SpanKind {
        SpanKind::Consumer
    }

    fn root_attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new(semconv::FAAS_TRIGGER, semconv::FAAS_TRIGGER_PUBSUB),
            KeyValue::new(semconv::MESSAGING_SYSTEM, semconv::MESSAGING_SYSTEM_SQS),
            KeyValue::new(semconv::MESSAGING_OPERATION, semconv::MESSAGING_OPERATION_PROCESS),
            KeyValue::new(
                semconv::MESSAGING_DESTINATION_KIND,
                semconv::MESSAGING_DESTINATION_KIND_QUEUE,
            ),
            KeyValue::new(semconv::MESSAGING_MESSAGE_ID, self.message_id.clone()),
        ]
    }
}

impl TraceCarrier for StorageRecord {
    fn parent_context(&self) -> TraceContext {
        TraceContext::root()
    }

    fn span_kind(&self) -> SpanKind {
        SpanKind::Consumer
    }

    fn root_attributes(&self) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new(semconv::FAAS_TRIGGER, semconv::FAAS_TRIGGER_DATASOURCE),
            KeyValue::new(
                semconv::FAAS_DOCUMENT_OPERATION,
                semconv::FAAS_DOCUMENT_OPERATION_INSERT,
            ),
            KeyValue::new(semconv::FAAS_DOCUMENT_COLLECTION, self.bucket.clone()),
            KeyValue::new(semconv::FAAS_DOCUMENT_NAME, self.key.clone()),
        ];
        if let Some(event_time) = &self.event_time {
            attributes.push(KeyValue::new(semconv::FAAS_DOCUMENT_TIME, event_time.clone()));
        }
        attributes
    }
}

impl TraceCarrier for TimerTrigger {
    fn parent_context(&self) -> TraceContext {
        TraceContext::root()
    }

    fn span_kind(&self) -> SpanKind {
        SpanKind::Server
    }

    fn root_attributes(&self) -> Vec<KeyValue> {
        let mut attributes = vec![KeyValue::new(
            semconv::FAAS_TRIGGER,
            semconv::FAAS_TRIGGER_TIMER,
        )];
        if let Some(time) = &self.time {
            attributes.push(KeyValue::new(semconv::FAAS_TIME, time.clone()));
        }
        attributes
    }
}

/// Writes `context` into the outgoing queue body. An invalid context leaves
/// the location untouched.
pub fn inject_into_location(location: &mut ObjectLocation, context: &TraceContext) {
    let propagator = TraceContextPropagator::new();
    propagator.inject_context(&context.to_otel_context(), &mut LocationInjector(location));
}

/// Parent context named by a queue body that has already been decoded.
pub fn extract_from_location(location: &ObjectLocation) -> TraceContext {
    extract(&LocationExtractor(location))
}

fn extract(extractor: &dyn Extractor) -> TraceContext {
    let propagator = TraceContextPropagator::new();
    let cx = propagator.extract_with_context(&Context::new(), extractor);
    TraceContext::from_otel_context(&cx)
}

struct HeaderExtractor<'a>(&'a HttpRequest);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.header(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.headers.keys().map(String::as_str).collect()
    }
}

struct BodyExtractor<'a>(&'a Map<String, Value>);

impl Extractor for BodyExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

struct LocationExtractor<'a>(&'a ObjectLocation);

impl Extractor for LocationExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        match key {
            TRACEPARENT => self.0.traceparent.as_deref(),
            TRACESTATE => self.0.tracestate.as_deref(),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<&str> {
        vec![TRACEPARENT, TRACESTATE]
    }
}

struct LocationInjector<'a>(&'a mut ObjectLocation);

impl Injector for LocationInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        match key {
            TRACEPARENT => self.0.traceparent = Some(value),
            TRACESTATE if !value.is_empty() => self.0.tracestate = Some(value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

    use super::*;

    const PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn request_with_headers(headers: &[(&str, &str)]) -> HttpRequest {
        HttpRequest {
            http_method: "POST".to_string(),
            resource: Some("/create".to_string()),
            path: Some("/create".to_string()),
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: None,
        }
    }

    fn queue_record(body: &str) -> QueueRecord {
        QueueRecord {
            message_id: "m-1".to_string(),
            body: body.to_string(),
            message_attributes: BTreeMap::new(),
        }
    }

    fn sampled_context() -> TraceContext {
        TraceContext::from_span_context(SpanContext::new(
            TraceId::from_bytes([7; 16]),
            SpanId::from_bytes([9; 8]),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        ))
    }

    #[test]
    fn http_parent_is_read_from_headers_in_any_case() {
        let parent = request_with_headers(&[("TraceParent", PARENT)]).parent_context();

        assert!(parent.is_valid());
        assert_eq!(parent.trace_id_hex(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(parent.span_id_hex(), "00f067aa0ba902b7");
    }

    #[test]
    fn malformed_traceparent_header_starts_new_trace() {
        let parent = request_with_headers(&[("traceparent", "00-garbage-01")]).parent_context();

        assert!(!parent.is_valid());
    }

    #[test]
    fn http_root_attributes_describe_the_request() {
        let request = request_with_headers(&[
            ("Host", "api.example.com"),
            ("User-Agent", "curl/8"),
            ("X-Forwarded-Proto", "https"),
        ]);
        let attributes = request.root_attributes();

        assert!(attributes.contains(&KeyValue::new("faas.trigger", "http")));
        assert!(attributes.contains(&KeyValue::new("http.method", "POST")));
        assert!(attributes.contains(&KeyValue::new("http.scheme", "https")));
        assert!(attributes.contains(&KeyValue::new("net.host.name", "api.example.com")));
        assert_eq!(request.span_kind(), SpanKind::Server);
    }

    #[test]
    fn queue_parent_is_read_from_body_field() {
        let record = queue_record(&format!(
            r#"{{"bucket":"out","key":"k1","traceparent":"{PARENT}"}}"#
        ));

        assert_eq!(
            record.parent_context().trace_id_hex(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(record.span_kind(), SpanKind::Consumer);
    }

    #[test]
    fn queue_body_without_trace_fields_or_malformed_is_a_new_root() {
        assert!(!queue_record(r#"{"bucket":"out","key":"k1"}"#).parent_context().is_valid());
        assert!(!queue_record("{not json").parent_context().is_valid());
        assert!(!queue_record("[1,2]").parent_context().is_valid());
    }

    #[test]
    fn storage_record_always_starts_new_trace() {
        let record = StorageRecord {
            bucket: "in".to_string(),
            key: "k1".to_string(),
            event_time: Some("2026-01-01T00:00:00Z".to_string()),
        };

        assert!(!record.parent_context().is_valid());
        assert!(record
            .root_attributes()
            .contains(&KeyValue::new("faas.document.collection", "in")));
        assert!(record
            .root_attributes()
            .contains(&KeyValue::new("faas.document.operation", "insert")));
    }

    #[test]
    fn injected_location_carries_context_to_the_next_stage() {
        let context = sampled_context();
        let mut location = ObjectLocation::new("out", "k1");
        inject_into_location(&mut location, &context);

        let json = location.to_json().expect("location should encode");
        let record = queue_record(&json);

        assert_eq!(
            location.traceparent.as_deref(),
            Some("00-07070707070707070707070707070707-0909090909090909-01")
        );
        assert_eq!(location.tracestate, None);
        assert_eq!(record.parent_context().span_context().trace_id(), TraceId::from_bytes([7; 16]));
        assert_eq!(extract_from_location(&location).span_id_hex(), "0909090909090909");
    }

    #[test]
    fn injecting_root_context_leaves_location_bare() {
        let mut location = ObjectLocation::new("out", "k1");
        inject_into_location(&mut location, &TraceContext::root());

        assert_eq!(
            location.to_json().expect("location should encode"),
            r#"{"bucket":"out","key":"k1"}"#
        );
    }
}
