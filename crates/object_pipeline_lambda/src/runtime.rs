use std::future::Future;
use std::time::{Duration, SystemTime};

use lambda_runtime::{Context, Error};
use object_pipeline_core::config::PipelineConfig;
use object_pipeline_core::contract::Stage;
use object_pipeline_core::fault::FaultInjector;
use object_pipeline_core::stages::{BatchReport, StageContext};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::adapters::{OtelTracer, S3BlobStore, SqsMessageQueue};

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";
/// Time kept back from the platform deadline so spans can still be flushed.
const FLUSH_MARGIN: Duration = Duration::from_millis(500);

/// Installs the JSON log formatter. `RUST_LOG` overrides the default `info`.
pub fn init_logging() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .without_time(),
        )
        .try_init()
        .map_err(|error| Error::from(format!("failed to install log subscriber: {error}")))
}

/// Builds the batch OTLP trace pipeline for `service_name`.
pub fn init_tracer_provider(service_name: &str) -> Result<TracerProvider, Error> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|error| Error::from(format!("failed to create OTLP span exporter: {error}")))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]))
        .build())
}

/// Long-lived state reused across invocations of one execution environment.
pub struct PipelineRuntime {
    pub stage: Stage,
    pub config: PipelineConfig,
    pub faults: FaultInjector,
    pub tracer: OtelTracer,
    pub store: S3BlobStore,
    pub queue: SqsMessageQueue,
    provider: TracerProvider,
}

impl PipelineRuntime {
    /// Reads configuration, installs logging and tracing and creates the AWS
    /// clients. Missing settings for `stage` fail the cold start.
    pub async fn init(stage: Stage) -> Result<Self, Error> {
        init_logging()?;
        let config = PipelineConfig::from_env()?;
        config.validate_for(stage)?;

        let provider = init_tracer_provider(&config.service_name)?;
        let tracer = OtelTracer::new(provider.tracer(config.service_name.clone()));

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        tracing::info!(
            service.name = config.service_name.as_str(),
            stage = stage.as_str(),
            batch_policy = ?config.batch_policy,
            "runtime initialised"
        );

        Ok(Self {
            stage,
            faults: FaultInjector::from_clock(),
            tracer,
            store: S3BlobStore::new(aws_sdk_s3::Client::new(&aws_config)),
            queue: SqsMessageQueue::new(aws_sdk_sqs::Client::new(&aws_config)),
            provider,
            config,
        })
    }

    pub fn stage_context(&self, invocation: &Context) -> StageContext<'_> {
        StageContext::new(&self.config, &self.tracer, &self.faults)
            .with_request_id(invocation.request_id.clone())
    }

    /// Pushes finished spans out before the execution environment freezes.
    pub fn flush(&self) {
        for result in self.provider.force_flush() {
            if let Err(error) = result {
                tracing::warn!(error = %error, "failed to flush spans");
            }
        }
    }

    pub fn shutdown(&self) {
        if let Err(error) = self.provider.shutdown() {
            tracing::warn!(error = %error, "failed to shut down tracer provider");
        }
    }
}

/// Time left before the platform kills the invocation, minus the flush margin.
pub fn remaining_time(invocation: &Context, now: SystemTime) -> Duration {
    invocation
        .deadline()
        .duration_since(now)
        .unwrap_or_default()
        .saturating_sub(FLUSH_MARGIN)
}

/// Runs `work` until the invocation deadline. Dropping the future on timeout
/// cancels any in-flight storage or queue call and closes its spans.
pub async fn with_deadline<T>(
    invocation: &Context,
    work: impl Future<Output = T>,
) -> Result<T, Error> {
    let budget = remaining_time(invocation, SystemTime::now());
    tokio::time::timeout(budget, work).await.map_err(|_| {
        Error::from(format!(
            "invocation deadline reached after {} ms",
            budget.as_millis()
        ))
    })
}

/// Turns a batch report into the invocation result. Any failed or skipped
/// record fails the invocation so the transport redelivers.
pub fn batch_result(stage: Stage, report: BatchReport) -> Result<(), Error> {
    tracing::info!(
        stage = stage.as_str(),
        processed = report.processed,
        failed = report.failed,
        skipped = report.skipped,
        "batch finished"
    );
    if report.is_clean() {
        Ok(())
    } else {
        Err(Error::from(format!(
            "{} record(s) failed and {} skipped",
            report.failed, report.skipped
        )))
    }
}
