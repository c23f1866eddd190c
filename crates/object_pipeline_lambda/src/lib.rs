//! AWS Lambda wiring for the traced object pipeline.
//!
//! The stage logic lives in `object_pipeline_core`; this crate supplies the
//! S3, SQS and OpenTelemetry adapters, the per-invocation handlers and the
//! process runtime shared by the four binaries.

pub mod adapters;
pub mod handlers;
pub mod runtime;
