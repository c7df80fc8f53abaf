//! # mediagraph
//!
//! A media pipeline execution core: elements connected through negotiable
//! pads, driven together through a shared state machine and reporting
//! through a message bus, while the graph changes under them.
//!
//! ## Features
//!
//! - **Caps negotiation**: structured formats with ranges, lists and
//!   fixation, resolved once per link
//! - **State machine**: NULL, READY, PAUSED and PLAYING walked sinks-first,
//!   with asynchronous preroll and rollback on failure
//! - **Dynamic pads**: request pads for fanout, sometimes pads announced
//!   from streaming threads and linked on the control thread
//! - **Message bus**: filtered blocking pops, a tokio watch and a stream
//! - **Discoverer**: bounded-time probing of URIs on a worker runtime
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mediagraph::prelude::*;
//!
//! mediagraph::init();
//! let mut pipeline = mediagraph::parse_launch(
//!     "testsrc num-buffers=100 ! video/x-raw, width=320 ! fakesink",
//! )?;
//! pipeline.set_state(State::Playing)?;
//! while let Some(msg) = pipeline.timed_pop_filtered(None, MessageType::EOS | MessageType::ERROR) {
//!     println!("{msg}");
//!     break;
//! }
//! pipeline.set_state(State::Null)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod bus;
pub mod caps;
pub mod clock;
pub mod control;
pub mod discoverer;
pub mod element;
pub mod elements;
pub mod error;
pub mod event;
mod init;
pub mod negotiation;
pub mod observability;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::bus::{Bus, Message, MessageBody, MessageType};
    pub use crate::caps::{Caps, Structure};
    pub use crate::clock::ClockTime;
    pub use crate::element::{Element, ElementContext, ElementImpl, FlowError, FlowResult, PadTemplate, State};
    pub use crate::error::{Error, Result};
    pub use crate::event::{SeekFlags, SeekEvent};
    pub use crate::pipeline::{ElementFactory, ElementId, Pipeline, PipelineConfig};
}

pub use caps::Caps;
pub use clock::ClockTime;
pub use element::{Element, State};
pub use error::{Error, MisuseError, Result};
pub use init::{deinit, init, is_initialized, parse_launch, register_element, registry};
pub use pipeline::Pipeline;
