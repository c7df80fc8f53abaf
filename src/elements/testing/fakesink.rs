//! FakeSink: discards everything it receives.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::clock::ClockTime;
use crate::element::{
    ElementContext, ElementImpl, FlowResult, PadTemplate, PropertyKind, PropertySpec, PropertyValue,
    StateChange, StateChangeSuccess,
};
use crate::error::{Error, Result};
use crate::event::{Event, Query};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// A sink that drops all buffers.
///
/// With `async=true` it completes READY to PAUSED only once the first
/// buffer has arrived, the way a rendering sink waits for preroll.
/// Position queries report the end of the last buffer seen.
#[derive(Default)]
pub struct FakeSink {
    is_async: AtomicBool,
    caps: Mutex<Option<Caps>>,
    received: AtomicU64,
    last_end: Mutex<Option<ClockTime>>,
}

impl FakeSink {
    /// Create a synchronous fake sink accepting any caps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers received since the last READY to PAUSED.
    pub fn buffers_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl ElementImpl for FakeSink {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![PadTemplate::sink(Caps::new_any())]
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::new("async", PropertyKind::Bool, false, "Wait for a buffer before completing PAUSED"),
            PropertySpec::new("caps", PropertyKind::Caps, Caps::new_any(), "Formats to accept"),
            PropertySpec::new("buffers-received", PropertyKind::Int, 0, "Buffers received so far").read_only(),
        ]
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        match name {
            "async" => self.is_async.store(value.as_bool().unwrap_or(false), Ordering::Relaxed),
            "caps" => *self.caps.lock().unwrap_or_else(PoisonError::into_inner) = value.as_caps(),
            _ => {
                return Err(Error::UnknownProperty {
                    element: String::new(),
                    property: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "async" => Some(self.is_async.load(Ordering::Relaxed).into()),
            "caps" => self
                .caps
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .map(PropertyValue::Caps),
            "buffers-received" => Some(PropertyValue::Integer(self.buffers_received() as i64)),
            _ => None,
        }
    }

    fn query_caps(&self, _pad: &str, template: &PadTemplate) -> Caps {
        self.caps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| template.caps.clone())
    }

    fn change_state(&self, _ctx: &ElementContext, transition: StateChange) -> Result<StateChangeSuccess> {
        if transition == StateChange::READY_TO_PAUSED {
            self.received.store(0, Ordering::Relaxed);
            *self.last_end.lock().unwrap_or_else(PoisonError::into_inner) = None;
            if self.is_async.load(Ordering::Relaxed) {
                return Ok(StateChangeSuccess::Async);
            }
        }
        Ok(StateChangeSuccess::Success)
    }

    fn chain(&self, ctx: &ElementContext, _pad: &str, buffer: Buffer) -> FlowResult {
        let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(element = %ctx.name(), count, pts = ?buffer.pts(), "discarding buffer");
        if let Some(end) = buffer.end_time() {
            *self.last_end.lock().unwrap_or_else(PoisonError::into_inner) = Some(end);
        }
        Ok(())
    }

    fn sink_event(&self, _ctx: &ElementContext, _pad: &str, _event: Event) -> bool {
        true
    }

    fn query(&self, _ctx: &ElementContext, query: &mut Query) -> bool {
        match query {
            Query::Position(position) => {
                *position = *self.last_end.lock().unwrap_or_else(PoisonError::into_inner);
                position.is_some()
            }
            _ => false,
        }
    }
}
