//! The element implementation interface.
//!
//! An element kind is a type implementing [`ElementImpl`], registered with
//! the [`crate::pipeline::ElementFactory`]. The framework wraps each
//! instance in a core that owns its pads, tracks its state and routes data;
//! the implementation only supplies behaviour.
//!
//! All methods take `&self`: data arrives on streaming threads while the
//! application changes properties and states from its own thread, so
//! implementations keep their mutable state behind their own locks and must
//! not hold those locks while pushing downstream.

use super::context::ElementContext;
use super::pad::PadTemplate;
use super::property::{PropertySpec, PropertyValue};
use super::state::{StateChange, StateChangeSuccess};
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::error::{Error, Result};
use crate::event::{Event, Query};
use thiserror::Error as ThisError;

/// Why data stopped flowing.
///
/// These are ordinary streaming outcomes, not programming errors: a source
/// receiving `Flushing` simply stops its loop.
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowError {
    /// The pad has no peer.
    #[error("not-linked")]
    NotLinked,
    /// The receiver is flushing or not in a streaming state.
    #[error("flushing")]
    Flushing,
    /// The receiver already got end-of-stream.
    #[error("eos")]
    Eos,
    /// The receiver hit an error and posted it on the bus.
    #[error("error")]
    Error,
}

/// Outcome of pushing one buffer.
pub type FlowResult = std::result::Result<(), FlowError>;

/// Behaviour of one element kind.
pub trait ElementImpl: Send + Sync + 'static {
    /// Pad templates. `Always` templates become pads when the element is built.
    fn pad_templates(&self) -> Vec<PadTemplate>;

    /// Declared properties.
    fn properties(&self) -> Vec<PropertySpec> {
        Vec::new()
    }

    /// Store a property. The value has already been coerced to the declared
    /// kind, and unknown or read-only names never reach this method.
    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        Err(Error::UnknownProperty {
            element: String::new(),
            property: name.to_string(),
        })
    }

    /// Current value of a property, or `None` if unset.
    fn property(&self, _name: &str) -> Option<PropertyValue> {
        None
    }

    /// Configure from a URI. Only called for factories registered with
    /// URI protocols.
    fn set_uri(&self, uri: &str) -> Result<()> {
        Err(Error::InvalidUri(uri.to_string()))
    }

    /// Formats a pad can handle right now. Defaults to the template caps.
    fn query_caps(&self, _pad: &str, template: &PadTemplate) -> Caps {
        template.caps.clone()
    }

    /// Perform one state transition.
    ///
    /// Sinks may return [`StateChangeSuccess::Async`] from READY to PAUSED;
    /// the transition then completes when the first buffer arrives.
    fn change_state(
        &self,
        _ctx: &ElementContext,
        _transition: StateChange,
    ) -> Result<StateChangeSuccess> {
        Ok(StateChangeSuccess::Success)
    }

    /// Handle a buffer arriving on sink pad `pad`.
    fn chain(&self, _ctx: &ElementContext, _pad: &str, _buffer: Buffer) -> FlowResult {
        Ok(())
    }

    /// Handle a downstream event arriving on sink pad `pad`. The default
    /// forwards it out of every src pad.
    fn sink_event(&self, ctx: &ElementContext, _pad: &str, event: Event) -> bool {
        ctx.push_event(event)
    }

    /// Handle an upstream event (seek). Only sources receive these.
    fn src_event(&self, _ctx: &ElementContext, _event: Event) -> bool {
        false
    }

    /// Answer a query. Return `true` if `query` was filled in.
    fn query(&self, _ctx: &ElementContext, _query: &mut Query) -> bool {
        false
    }

    /// A request pad named `name` is about to be created from `template`.
    fn request_pad(&self, _ctx: &ElementContext, _template: &PadTemplate, _name: &str) -> Result<()> {
        Ok(())
    }

    /// The request pad `name` was released.
    fn release_pad(&self, _ctx: &ElementContext, _name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_error_display() {
        assert_eq!(FlowError::NotLinked.to_string(), "not-linked");
        assert_eq!(FlowError::Flushing.to_string(), "flushing");
    }
}
