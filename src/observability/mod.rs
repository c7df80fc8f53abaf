//! Observability: metrics and tracing.
//!
//! ## Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `mediagraph_buffers_pushed` | Counter | element |
//! | `mediagraph_bytes_pushed` | Counter | element |
//! | `mediagraph_buffers_dropped` | Counter | element |
//! | `mediagraph_state_changes` | Counter | element, transition |
//! | `mediagraph_messages_posted` | Counter | type |
//! | `mediagraph_negotiation_failures` | Counter | upstream, downstream |
//!
//! Nothing is exported by default; install a `metrics` recorder
//! (prometheus, statsd, ...) in the application to collect them.
//!
//! ## Tracing
//!
//! State walks run inside a `pipeline` span, streaming threads inside an
//! `element` span, and discovery probes inside a `discover` span.

mod metrics;
mod tracing_support;

pub use metrics::{
    ElementMetrics, init_metrics, record_buffer_dropped, record_buffer_pushed,
    record_message_posted, record_negotiation_failure, record_state_change,
};
pub use tracing_support::{span_discover, span_element, span_pipeline, trace_state_change};
