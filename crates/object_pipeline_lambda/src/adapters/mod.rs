pub mod object_store;
pub mod queue;
pub mod tracer;

pub use object_store::S3BlobStore;
pub use queue::SqsMessageQueue;
pub use tracer::OtelTracer;
