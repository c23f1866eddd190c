#![allow(dead_code)]

use object_pipeline_core::config::{BatchPolicy, FaultRates, PipelineConfig};
use object_pipeline_core::contract::HANDLER_SPAN_NAME;
use object_pipeline_core::fault::FaultInjector;
use object_pipeline_core::stages::StageContext;
use object_pipeline_core::test_helpers::{
    test_config, InMemoryBlobStore, RecordedSpan, RecordingQueue, RecordingTracer,
    TEST_INPUT_BUCKET, TEST_OUTPUT_BUCKET,
};

/// Everything one stage invocation needs, backed by in-memory fakes.
pub struct Harness {
    pub config: PipelineConfig,
    pub tracer: RecordingTracer,
    pub faults: FaultInjector,
    pub store: InMemoryBlobStore,
    pub queue: RecordingQueue,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Input and output buckets exist, fault injection is off.
    pub fn new() -> Self {
        Self {
            config: test_config(),
            tracer: RecordingTracer::new(),
            faults: FaultInjector::with_seed(11),
            store: InMemoryBlobStore::with_buckets(&[TEST_INPUT_BUCKET, TEST_OUTPUT_BUCKET]),
            queue: RecordingQueue::new(),
        }
    }

    /// Overrides the fault denominators; `1` makes every draw inject.
    pub fn with_faults(mut self, rates: FaultRates) -> Self {
        self.config.fault_rates = rates;
        self
    }

    pub fn with_batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.config.batch_policy = policy;
        self
    }

    pub fn with_queue(mut self, queue: RecordingQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn context(&self) -> StageContext<'_> {
        StageContext::new(&self.config, &self.tracer, &self.faults).with_request_id("req-1")
    }

    pub fn root_spans(&self) -> Vec<RecordedSpan> {
        self.tracer.spans_named(HANDLER_SPAN_NAME)
    }

    pub fn only_root_span(&self) -> RecordedSpan {
        let mut roots = self.root_spans();
        assert_eq!(roots.len(), 1, "expected exactly one root span");
        roots.remove(0)
    }

    /// Children of `parent`, in start order.
    pub fn children_of(&self, parent: &RecordedSpan) -> Vec<RecordedSpan> {
        self.tracer
            .spans()
            .into_iter()
            .filter(|span| span.parent == parent.context)
            .collect()
    }
}

pub fn assert_all_spans_ended_once(tracer: &RecordingTracer) {
    for span in tracer.spans() {
        assert_eq!(span.end_count, 1, "span {} ended {} times", span.name, span.end_count);
    }
}
