pub mod carrier;
pub mod semconv;
pub mod span;

pub use carrier::TraceCarrier;
pub use span::{SpanHandle, SpanRecorder, TraceContext, Tracer};
