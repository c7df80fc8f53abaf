//! Tracing spans for pipelines and elements.

use tracing::{Level, Span, span};

/// Span covering work done on behalf of a pipeline.
///
/// ```rust,ignore
/// let _guard = span_pipeline("pipeline0").entered();
/// ```
#[inline]
pub fn span_pipeline(name: &str) -> Span {
    span!(Level::INFO, "pipeline", name = %name)
}

/// Span covering work done inside one element, such as a streaming thread.
#[inline]
pub fn span_element(element: &str, factory: &str) -> Span {
    span!(
        Level::DEBUG,
        "element",
        element = %element,
        factory = %factory
    )
}

/// Span for one discovery probe.
#[inline]
pub fn span_discover(uri: &str) -> Span {
    span!(Level::INFO, "discover", uri = %uri)
}

/// Log an element state transition.
#[inline]
pub fn trace_state_change(element: &str, from: &str, to: &str) {
    tracing::debug!(
        element = %element,
        from = %from,
        to = %to,
        "state changed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_creation() {
        let _span = span_pipeline("test-pipeline");
        let _span = span_element("src0", "testsrc");
        let _guard = span_discover("file:///tmp/x").entered();
        trace_state_change("src0", "NULL", "READY");
    }
}
