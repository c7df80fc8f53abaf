//! CapsFilter: constrains negotiation without touching data.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    ElementContext, ElementImpl, FlowResult, PadTemplate, PropertyKind, PropertySpec, PropertyValue,
};
use crate::error::{Error, Result};
use std::sync::{Mutex, PoisonError};

/// Passes buffers through while advertising only the formats in its
/// `caps` property on both pads.
///
/// Launch lines create one for a bare caps string between two elements:
/// `testsrc ! video/x-raw, width=640 ! fakesink`.
pub struct CapsFilter {
    caps: Mutex<Caps>,
}

impl Default for CapsFilter {
    fn default() -> Self {
        Self {
            caps: Mutex::new(Caps::new_any()),
        }
    }
}

impl CapsFilter {
    /// Create a filter that lets anything through.
    pub fn new() -> Self {
        Self::default()
    }

    fn caps(&self) -> Caps {
        self.caps.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ElementImpl for CapsFilter {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![
            PadTemplate::sink(Caps::new_any()),
            PadTemplate::src(Caps::new_any()),
        ]
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::new(
            "caps",
            PropertyKind::Caps,
            Caps::new_any(),
            "Formats allowed through",
        )]
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        if name != "caps" {
            return Err(Error::UnknownProperty {
                element: String::new(),
                property: name.to_string(),
            });
        }
        *self.caps.lock().unwrap_or_else(PoisonError::into_inner) =
            value.as_caps().unwrap_or_else(Caps::new_any);
        Ok(())
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        (name == "caps").then(|| PropertyValue::Caps(self.caps()))
    }

    fn query_caps(&self, _pad: &str, template: &PadTemplate) -> Caps {
        template.caps.intersect(&self.caps())
    }

    fn chain(&self, ctx: &ElementContext, _pad: &str, buffer: Buffer) -> FlowResult {
        ctx.push("src", buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricts_both_pads() {
        let filter = CapsFilter::new();
        let caps: Caps = "video/x-raw, width=640".parse().unwrap();
        filter.set_property("caps", &PropertyValue::Caps(caps.clone())).unwrap();
        for template in filter.pad_templates() {
            assert_eq!(filter.query_caps(&template.name, &template), caps);
        }
    }
}
