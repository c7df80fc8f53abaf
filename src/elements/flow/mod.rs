//! Flow control and routing elements.
//!
//! - [`Queue`]: thread boundary with a bounded buffer and optional leaking
//! - [`Tee`]: 1-to-N fanout over request pads

mod queue;
mod tee;

pub use queue::{LeakyMode, Queue};
pub use tee::Tee;

use crate::element::{FlowError, FlowResult};

/// Merge the results of pushing one buffer out of several src pads.
///
/// The buffer counts as delivered if any pad took it. Otherwise an error
/// beats flushing, which beats end-of-stream. When no pad is linked the
/// result is `not-linked`, unless `allow_not_linked` is set.
pub(crate) fn combine_flows(results: &[FlowResult], allow_not_linked: bool) -> FlowResult {
    if results.iter().any(|r| r.is_ok()) {
        return Ok(());
    }
    for reason in [FlowError::Error, FlowError::Flushing, FlowError::Eos] {
        if results.contains(&Err(reason)) {
            return Err(reason);
        }
    }
    if allow_not_linked {
        Ok(())
    } else {
        Err(FlowError::NotLinked)
    }
}
