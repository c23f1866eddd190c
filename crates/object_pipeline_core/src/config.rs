use crate::contract::Stage;
use crate::error::StageError;

pub const DEFAULT_SERVICE_NAME: &str = "object-pipeline";
pub const DEFAULT_STAGE_FAULT_DENOMINATOR: u32 = 15;
pub const DEFAULT_DELETE_FAULT_DENOMINATOR: u32 = 3;

/// Per-stage fault probability denominators; `0` disables injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRates {
    pub create: u32,
    pub update: u32,
    pub check: u32,
    pub delete: u32,
}

impl FaultRates {
    pub fn uniform(denominator: u32) -> Self {
        Self {
            create: denominator,
            update: denominator,
            check: denominator,
            delete: denominator,
        }
    }

    pub fn disabled() -> Self {
        Self::uniform(0)
    }

    pub fn for_stage(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Create => self.create,
            Stage::Update => self.update,
            Stage::Check => self.check,
            Stage::Delete => self.delete,
        }
    }
}

impl Default for FaultRates {
    fn default() -> Self {
        Self {
            create: DEFAULT_STAGE_FAULT_DENOMINATOR,
            update: DEFAULT_STAGE_FAULT_DENOMINATOR,
            check: DEFAULT_STAGE_FAULT_DENOMINATOR,
            delete: DEFAULT_DELETE_FAULT_DENOMINATOR,
        }
    }
}

/// What a batch-triggered stage does with the remaining records after one
/// record fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    StopOnFirstFailure,
    #[default]
    ContinueOnFailure,
}

impl BatchPolicy {
    pub fn parse(raw: &str) -> Result<Self, StageError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stop" | "stop_on_first_failure" => Ok(Self::StopOnFirstFailure),
            "continue" | "continue_on_failure" => Ok(Self::ContinueOnFailure),
            _ => Err(StageError::config(format!(
                "Unsupported BATCH_FAILURE_POLICY '{raw}' (expected stop or continue)"
            ))),
        }
    }
}

/// Runtime configuration, read once at startup and handed to every stage.
///
/// Bucket and queue settings are optional because each stage only needs a
/// subset; the accessors fail with a configuration error when a stage asks for
/// one that was never provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub service_name: String,
    pub input_bucket: Option<String>,
    pub output_bucket: Option<String>,
    pub queue_url: Option<String>,
    pub queue_name: Option<String>,
    pub fault_rates: FaultRates,
    pub batch_policy: BatchPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            input_bucket: None,
            output_bucket: None,
            queue_url: None,
            queue_name: None,
            fault_rates: FaultRates::default(),
            batch_policy: BatchPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, StageError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StageError> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let defaults = FaultRates::default();
        let fault_rates = FaultRates {
            create: denominator(&non_empty, "CREATE_FAULT_DENOMINATOR", defaults.create)?,
            update: denominator(&non_empty, "UPDATE_FAULT_DENOMINATOR", defaults.update)?,
            check: denominator(&non_empty, "CHECK_FAULT_DENOMINATOR", defaults.check)?,
            delete: denominator(&non_empty, "DELETE_FAULT_DENOMINATOR", defaults.delete)?,
        };

        let batch_policy = match non_empty("BATCH_FAILURE_POLICY") {
            Some(raw) => BatchPolicy::parse(&raw)?,
            None => BatchPolicy::default(),
        };

        Ok(Self {
            service_name: non_empty("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            input_bucket: non_empty("INPUT_S3_BUCKET_NAME"),
            output_bucket: non_empty("OUTPUT_S3_BUCKET_NAME"),
            queue_url: non_empty("SQS_QUEUE_URL"),
            queue_name: non_empty("SQS_QUEUE_NAME"),
            fault_rates,
            batch_policy,
        })
    }

    pub fn input_bucket(&self) -> Result<&str, StageError> {
        required(self.input_bucket.as_deref(), "INPUT_S3_BUCKET_NAME")
    }

    pub fn output_bucket(&self) -> Result<&str, StageError> {
        required(self.output_bucket.as_deref(), "OUTPUT_S3_BUCKET_NAME")
    }

    pub fn queue_url(&self) -> Result<&str, StageError> {
        required(self.queue_url.as_deref(), "SQS_QUEUE_URL")
    }

    /// Queue name used for span attributes; falls back to the last URL segment.
    pub fn queue_name(&self) -> &str {
        self.queue_name
            .as_deref()
            .or_else(|| {
                self.queue_url
                    .as_deref()
                    .and_then(|url| url.rsplit('/').next())
            })
            .unwrap_or_default()
    }

    /// Fails fast when a stage's required settings are missing.
    pub fn validate_for(&self, stage: Stage) -> Result<(), StageError> {
        match stage {
            Stage::Create | Stage::Delete => self.input_bucket().map(|_| ()),
            Stage::Update => {
                self.output_bucket()?;
                self.queue_url().map(|_| ())
            }
            Stage::Check => Ok(()),
        }
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str, StageError> {
    value.ok_or_else(|| StageError::config(format!("{key} must be configured")))
}

fn denominator(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u32,
) -> Result<u32, StageError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            StageError::config(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn reads_buckets_queue_and_defaults() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("OTEL_SERVICE_NAME", "update-lambda"),
            ("OUTPUT_S3_BUCKET_NAME", "out"),
            ("SQS_QUEUE_URL", "https://sqs.eu-west-1.amazonaws.com/123/objects.fifo"),
        ]))
        .expect("config should load");

        assert_eq!(config.service_name, "update-lambda");
        assert_eq!(config.output_bucket().expect("output bucket"), "out");
        assert_eq!(config.queue_name(), "objects.fifo");
        assert_eq!(config.fault_rates, FaultRates::default());
        assert_eq!(config.batch_policy, BatchPolicy::ContinueOnFailure);
        assert!(config.validate_for(Stage::Update).is_ok());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("INPUT_S3_BUCKET_NAME", "  "),
            ("OTEL_SERVICE_NAME", ""),
        ]))
        .expect("config should load");

        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        let error = config
            .validate_for(Stage::Create)
            .expect_err("missing input bucket should fail");
        assert_eq!(
            error,
            StageError::config("INPUT_S3_BUCKET_NAME must be configured")
        );
    }

    #[test]
    fn parses_fault_overrides_and_batch_policy() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("DELETE_FAULT_DENOMINATOR", "0"),
            ("CHECK_FAULT_DENOMINATOR", "100"),
            ("BATCH_FAILURE_POLICY", "Stop"),
        ]))
        .expect("config should load");

        assert_eq!(config.fault_rates.for_stage(Stage::Delete), 0);
        assert_eq!(config.fault_rates.for_stage(Stage::Check), 100);
        assert_eq!(config.fault_rates.for_stage(Stage::Create), 15);
        assert_eq!(config.batch_policy, BatchPolicy::StopOnFirstFailure);
    }

    #[test]
    fn rejects_invalid_fault_denominator() {
        let error = PipelineConfig::from_lookup(lookup_from(&[("UPDATE_FAULT_DENOMINATOR", "-1")]))
            .expect_err("negative denominator should fail");

        assert!(error.to_string().contains("UPDATE_FAULT_DENOMINATOR"));
    }

    #[test]
    fn rejects_unknown_batch_policy() {
        let error = PipelineConfig::from_lookup(lookup_from(&[("BATCH_FAILURE_POLICY", "retry")]))
            .expect_err("unknown policy should fail");

        assert!(matches!(error, StageError::Config(_)));
    }
}
