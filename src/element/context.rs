//! Element runtime context.
//!
//! The context is what an [`super::ElementImpl`] uses to talk to the rest
//! of the graph: push buffers and events out of its pads, announce
//! sometimes pads and post messages. It holds only a weak reference to the
//! element, so implementations may clone it into their worker threads.

use super::core::ElementCore;
use super::state::State;
use super::traits::{FlowError, FlowResult};
use crate::buffer::Buffer;
use crate::bus::MessageBody;
use crate::caps::Caps;
use crate::error::{Error, Result};
use crate::event::Event;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Runtime context for an element.
#[derive(Clone)]
pub struct ElementContext {
    core: Weak<ElementCore>,
    name: String,
}

impl ElementContext {
    pub(crate) fn new(core: Weak<ElementCore>, name: String) -> Self {
        Self { core, name }
    }

    fn core(&self) -> Option<Arc<ElementCore>> {
        self.core.upgrade()
    }

    /// The element's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push a buffer out of src pad `pad`.
    pub fn push(&self, pad: &str, buffer: Buffer) -> FlowResult {
        self.core()
            .ok_or(FlowError::Flushing)?
            .push(pad, buffer)
    }

    /// Send a downstream event out of every linked src pad. Returns `false`
    /// if any peer refused it.
    pub fn push_event(&self, event: Event) -> bool {
        let Some(core) = self.core() else {
            return false;
        };
        let mut handled = true;
        for pad in core.linked_src_pad_names() {
            handled &= core.push_event(&pad, event.clone());
        }
        handled
    }

    /// Send a downstream event out of one src pad.
    pub fn push_event_on(&self, pad: &str, event: Event) -> bool {
        self.core().is_some_and(|core| core.push_event(pad, event))
    }

    /// Names of the live src pads.
    pub fn src_pads(&self) -> Vec<String> {
        self.core()
            .map(|core| core.src_pad_names())
            .unwrap_or_default()
    }

    /// Names of the src pads that have a peer.
    pub fn linked_src_pads(&self) -> Vec<String> {
        self.core()
            .map(|core| core.linked_src_pad_names())
            .unwrap_or_default()
    }

    /// Block until at least `count` src pads are linked or `timeout`
    /// expires. Fails with [`FlowError::Flushing`] if the element stops
    /// streaming meanwhile.
    pub fn wait_src_linked(&self, count: usize, timeout: Duration) -> FlowResult {
        self.core()
            .ok_or(FlowError::Flushing)?
            .wait_linked(count, Instant::now() + timeout)
    }

    /// Create a pad from a sometimes template and announce it on the bus.
    /// Returns the new pad's name.
    pub fn add_pad(&self, template: &str, caps: Caps) -> Result<String> {
        self.core()
            .ok_or_else(|| Error::ElementNotFound(self.name.clone()))?
            .add_sometimes_pad(template, caps)
    }

    /// Last completed state.
    pub fn state(&self) -> State {
        self.core()
            .map(|core| core.current_state())
            .unwrap_or_default()
    }

    /// Whether the element is flushing.
    pub fn is_flushing(&self) -> bool {
        self.core().is_none_or(|core| core.is_flushing())
    }

    /// Post a message from this element.
    pub fn post(&self, body: MessageBody) {
        if let Some(core) = self.core() {
            core.post(body);
        }
    }

    /// Post a fatal error.
    pub fn post_error(&self, error: impl Into<String>, debug: Option<String>) {
        self.post(MessageBody::Error {
            error: error.into(),
            debug,
        });
    }

    /// Post a warning.
    pub fn post_warning(&self, warning: impl Into<String>, debug: Option<String>) {
        self.post(MessageBody::Warning {
            warning: warning.into(),
            debug,
        });
    }

    /// Tell the application the duration is now different.
    pub fn post_duration_changed(&self) {
        self.post(MessageBody::DurationChanged);
    }
}

impl std::fmt::Debug for ElementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementContext")
            .field("name", &self.name)
            .field("alive", &(self.core.strong_count() > 0))
            .finish()
    }
}
