//! Metrics collection using metrics-rs.

use crate::bus::MessageType;
use crate::element::StateChange;
use metrics::{Counter, Unit, counter};
use std::sync::atomic::{AtomicBool, Ordering};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUFFERS_PUSHED: &str = "mediagraph_buffers_pushed";
const BYTES_PUSHED: &str = "mediagraph_bytes_pushed";
const BUFFERS_DROPPED: &str = "mediagraph_buffers_dropped";
const STATE_CHANGES: &str = "mediagraph_state_changes";
const MESSAGES_POSTED: &str = "mediagraph_messages_posted";
const NEGOTIATION_FAILURES: &str = "mediagraph_negotiation_failures";

/// Register metric descriptions.
///
/// Called by [`crate::init`]. Safe to call multiple times.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_PUSHED,
        Unit::Count,
        "Buffers pushed out of element src pads"
    );
    metrics::describe_counter!(BYTES_PUSHED, Unit::Bytes, "Payload bytes pushed");
    metrics::describe_counter!(
        BUFFERS_DROPPED,
        Unit::Count,
        "Buffers dropped by leaky queues"
    );
    metrics::describe_counter!(
        STATE_CHANGES,
        Unit::Count,
        "Completed element state transitions"
    );
    metrics::describe_counter!(MESSAGES_POSTED, Unit::Count, "Messages posted on buses");
    metrics::describe_counter!(
        NEGOTIATION_FAILURES,
        Unit::Count,
        "Link attempts rejected by caps negotiation"
    );
}

/// Record a buffer pushed downstream.
#[inline]
pub fn record_buffer_pushed(element: &str, bytes: usize) {
    counter!(BUFFERS_PUSHED, "element" => element.to_string()).increment(1);
    counter!(BYTES_PUSHED, "element" => element.to_string()).increment(bytes as u64);
}

/// Record a buffer dropped by a leaky queue.
#[inline]
pub fn record_buffer_dropped(element: &str) {
    counter!(BUFFERS_DROPPED, "element" => element.to_string()).increment(1);
}

/// Record a completed state transition.
#[inline]
pub fn record_state_change(element: &str, transition: StateChange) {
    counter!(
        STATE_CHANGES,
        "element" => element.to_string(),
        "transition" => transition.to_string()
    )
    .increment(1);
}

/// Record a message posted on a bus.
#[inline]
pub fn record_message_posted(kind: MessageType) {
    counter!(MESSAGES_POSTED, "type" => message_type_label(kind)).increment(1);
}

/// Record a failed negotiation.
#[inline]
pub fn record_negotiation_failure(upstream: &str, downstream: &str) {
    counter!(
        NEGOTIATION_FAILURES,
        "upstream" => upstream.to_string(),
        "downstream" => downstream.to_string()
    )
    .increment(1);
}

fn message_type_label(kind: MessageType) -> &'static str {
    if kind == MessageType::ERROR {
        "error"
    } else if kind == MessageType::WARNING {
        "warning"
    } else if kind == MessageType::EOS {
        "eos"
    } else if kind == MessageType::STATE_CHANGED {
        "state-changed"
    } else if kind == MessageType::DURATION_CHANGED {
        "duration-changed"
    } else if kind == MessageType::ASYNC_DONE {
        "async-done"
    } else if kind == MessageType::PAD_ADDED {
        "pad-added"
    } else {
        "application"
    }
}

/// Per-element counters with labels resolved once.
///
/// Element cores hold one of these so the hot push path does not rebuild
/// label sets.
#[derive(Clone)]
pub struct ElementMetrics {
    element: String,
    buffers: Counter,
    bytes: Counter,
}

impl ElementMetrics {
    /// Create counters for `element`.
    pub fn new(element: &str) -> Self {
        Self {
            element: element.to_string(),
            buffers: counter!(BUFFERS_PUSHED, "element" => element.to_string()),
            bytes: counter!(BYTES_PUSHED, "element" => element.to_string()),
        }
    }

    /// Record one pushed buffer.
    #[inline]
    pub fn record_push(&self, bytes: usize) {
        self.buffers.increment(1);
        self.bytes.increment(bytes as u64);
    }

    /// Element the counters are labelled with.
    pub fn element(&self) -> &str {
        &self.element
    }
}

impl std::fmt::Debug for ElementMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementMetrics")
            .field("element", &self.element)
            .finish()
    }
}
