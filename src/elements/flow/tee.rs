//! Tee element - duplicates buffers to multiple outputs.

use super::combine_flows;
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    ElementContext, ElementImpl, FlowResult, PadDirection, PadPresence, PadTemplate,
    PropertyKind, PropertySpec, PropertyValue,
};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// An element that pushes every buffer out of each of its request pads.
///
/// Pads are requested from the `src_%u` template. Buffer payloads are
/// shared between branches, not copied.
///
/// Flow results of the branches are combined: the buffer counts as
/// delivered if any branch took it. Otherwise an error beats flushing,
/// which beats end-of-stream. When no branch is linked the result is
/// `not-linked`, unless `allow-not-linked` is set.
#[derive(Default)]
pub struct Tee {
    allow_not_linked: AtomicBool,
}

impl Tee {
    /// Create a new tee.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ElementImpl for Tee {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![
            PadTemplate::sink(Caps::new_any()),
            PadTemplate::new("src_%u", PadDirection::Src, PadPresence::Request, Caps::new_any()),
        ]
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::new(
            "allow-not-linked",
            PropertyKind::Bool,
            false,
            "Accept data when no branch is linked",
        )]
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        if name != "allow-not-linked" {
            return Err(Error::UnknownProperty {
                element: String::new(),
                property: name.to_string(),
            });
        }
        self.allow_not_linked
            .store(value.as_bool().unwrap_or(false), Ordering::Relaxed);
        Ok(())
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        (name == "allow-not-linked").then(|| self.allow_not_linked.load(Ordering::Relaxed).into())
    }

    fn chain(&self, ctx: &ElementContext, _pad: &str, buffer: Buffer) -> FlowResult {
        let results: Vec<FlowResult> = ctx
            .src_pads()
            .iter()
            .map(|pad| {
                let result = ctx.push(pad, buffer.clone());
                trace!(element = %ctx.name(), pad = %pad, ?result, "branch");
                result
            })
            .collect();
        combine_flows(&results, self.allow_not_linked.load(Ordering::Relaxed))
    }
}
