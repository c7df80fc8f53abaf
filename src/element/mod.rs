//! Elements: the processing units of a pipeline.
//!
//! An element kind is a type implementing [`ElementImpl`]. It declares pad
//! templates and properties, reacts to state transitions and handles the
//! buffers and events arriving on its sink pads. The framework wraps each
//! instance into an [`Element`] handle which owns the pads, tracks the
//! state and blocks or refuses data according to it.
//!
//! # Design
//!
//! Element kinds are an open set registered with a factory rather than a
//! class hierarchy: a source is an element without sink templates, a sink
//! one without src templates, and everything else is a filter.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediagraph::element::{ElementContext, ElementImpl, FlowResult, PadTemplate};
//! use mediagraph::{Buffer, Caps};
//!
//! struct Invert;
//!
//! impl ElementImpl for Invert {
//!     fn pad_templates(&self) -> Vec<PadTemplate> {
//!         vec![PadTemplate::sink(Caps::new_any()), PadTemplate::src(Caps::new_any())]
//!     }
//!
//!     fn chain(&self, ctx: &ElementContext, _pad: &str, buffer: Buffer) -> FlowResult {
//!         let data: Vec<u8> = buffer.data().iter().map(|b| !b).collect();
//!         ctx.push("src", Buffer::new(data).with_timing(buffer.pts(), buffer.duration()))
//!     }
//! }
//! ```

mod context;
mod core;
mod pad;
mod property;
mod state;
mod traits;

pub(crate) use self::core::ElementCore;
pub(crate) use pad::PadPeer;

pub use self::core::{Element, ElementWeak};
pub use context::ElementContext;
pub use pad::{PadDirection, PadId, PadInfo, PadPresence, PadTemplate};
pub use property::{PropertyKind, PropertySpec, PropertyValue};
pub use state::{State, StateChange, StateChangeSuccess};
pub use traits::{ElementImpl, FlowError, FlowResult};
