//! Trace-correlated stage handlers for the custom-object pipeline.
//!
//! This crate owns the object contract, the fault model, span recording and
//! trace propagation across HTTP, storage-event and queue boundaries, and the
//! four stage handlers. It intentionally excludes AWS SDK and Lambda runtime
//! concerns; those live behind the `ports` traits and are provided by
//! `object_pipeline_lambda`.

pub mod config;
pub mod contract;
pub mod error;
pub mod fault;
pub mod ports;
pub mod stages;
pub mod telemetry;
pub mod triggers;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
