//! Identity element for debugging.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    ElementContext, ElementImpl, FlowError, FlowResult, PadTemplate, PropertyKind, PropertySpec,
    PropertyValue, StateChange, StateChangeSuccess,
};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::{trace, warn};

/// An element that passes buffers through unchanged.
///
/// Setting `error-after` to N makes the N-th buffer fail with a posted
/// error, which is handy for exercising error handling.
pub struct Identity {
    error_after: AtomicI64,
    count: AtomicU64,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            error_after: AtomicI64::new(-1),
            count: AtomicU64::new(0),
        }
    }
}

impl Identity {
    /// Create a new identity element.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers passed since the last READY to PAUSED.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl ElementImpl for Identity {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![
            PadTemplate::sink(Caps::new_any()),
            PadTemplate::src(Caps::new_any()),
        ]
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::new(
            "error-after",
            PropertyKind::Int,
            -1,
            "Fail on this buffer (-1 = never)",
        )]
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        if name != "error-after" {
            return Err(Error::UnknownProperty {
                element: String::new(),
                property: name.to_string(),
            });
        }
        self.error_after
            .store(value.as_i64().unwrap_or(-1), Ordering::Relaxed);
        Ok(())
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        (name == "error-after").then(|| PropertyValue::Integer(self.error_after.load(Ordering::Relaxed)))
    }

    fn change_state(&self, _ctx: &ElementContext, transition: StateChange) -> Result<StateChangeSuccess> {
        if transition == StateChange::READY_TO_PAUSED {
            self.count.store(0, Ordering::Relaxed);
        }
        Ok(StateChangeSuccess::Success)
    }

    fn chain(&self, ctx: &ElementContext, _pad: &str, buffer: Buffer) -> FlowResult {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        let error_after = self.error_after.load(Ordering::Relaxed);
        if u64::try_from(error_after).is_ok_and(|n| count >= n) {
            warn!(element = %ctx.name(), count, "failing buffer on request");
            ctx.post_error(
                "induced error",
                Some(format!("error-after={error_after} reached at buffer {count}")),
            );
            return Err(FlowError::Error);
        }
        trace!(element = %ctx.name(), count, len = buffer.len(), "pass");
        ctx.push("src", buffer)
    }
}
