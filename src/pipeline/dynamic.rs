//! Dynamic pads: request pads and pads announced at run time.

use super::{ElementId, Pipeline};
use crate::caps::Caps;
use crate::error::{Error, Result};
use tracing::{debug, warn};

/// Pad-added callback. Runs on the control thread while the bus is drained.
pub(crate) type PadAddedHandler = Box<dyn FnMut(&mut Pipeline, &PadAddedInfo) + Send>;

/// Identifies a connected pad-added handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

/// A pad announced by an element.
#[derive(Debug, Clone, PartialEq)]
pub struct PadAddedInfo {
    /// The announcing element.
    pub element: ElementId,
    /// Its name.
    pub element_name: String,
    /// Name of the new pad.
    pub pad: String,
    /// Caps the pad was announced with.
    pub caps: Caps,
}

/// What [`Pipeline::link_announced`] did.
#[derive(Debug)]
pub enum PadAddedOutcome {
    /// The pads were linked with these caps.
    Linked(Caps),
    /// One of the two pads already has a peer; nothing was done.
    AlreadyLinked,
    /// The announced caps are not accepted by the sink pad.
    CapsMismatch {
        /// Caps of the new pad.
        announced: Caps,
        /// What the sink pad accepts.
        accepted: Caps,
    },
    /// Linking failed for another reason.
    Failed(Error),
}

impl PadAddedOutcome {
    /// Whether a link was made.
    pub fn is_linked(&self) -> bool {
        matches!(self, PadAddedOutcome::Linked(_))
    }
}

impl Pipeline {
    /// Create a pad from a request template of element `id`. Returns the
    /// new pad's name.
    pub fn request_pad(&mut self, id: ElementId, template: &str) -> Result<String> {
        let info = self.core(id)?.request_pad(template)?;
        Ok(info.name)
    }

    /// Release a request pad, unlinking it first if needed. A released pad
    /// can never be linked or released again.
    pub fn release_pad(&mut self, id: ElementId, pad: &str) -> Result<()> {
        let core = self.core(id)?;
        let pad_id = core.pad_id(pad)?;
        if core.peer(pad_id).is_some() {
            self.unlink_pad(id, pad)?;
        }
        core.release_pad(pad)
    }

    /// Run `handler` for every pad announced by element `id`, or by any
    /// element when `id` is `None`.
    pub fn connect_pad_added<F>(&mut self, id: Option<ElementId>, handler: F) -> HandlerId
    where
        F: FnMut(&mut Pipeline, &PadAddedInfo) + Send + 'static,
    {
        let handler_id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.push((handler_id, id, Box::new(handler)));
        handler_id
    }

    /// Remove a pad-added handler. Returns `false` if it was not connected.
    pub fn disconnect_pad_added(&mut self, handler: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(id, _, _)| *id != handler);
        self.handlers.len() != before
    }

    pub(super) fn run_pad_added_handlers(&mut self, info: &PadAddedInfo) {
        debug!(pipeline = %self.name, element = %info.element_name, pad = %info.pad, caps = %info.caps, "pad added");
        // Handlers get `&mut self`, so they are taken out while they run.
        // Handlers connected from inside a handler land in `self.handlers`.
        let mut handlers = std::mem::take(&mut self.handlers);
        for (_, element, handler) in handlers.iter_mut() {
            if element.is_none_or(|e| e == info.element) {
                handler(self, info);
            }
        }
        handlers.append(&mut self.handlers);
        self.handlers = handlers;
    }

    /// Link an announced pad to `sink_pad` of element `sink`.
    ///
    /// Safe to call for every announcement: a sink pad that already has a
    /// peer and caps the sink does not accept are reported without side
    /// effects.
    pub fn link_announced(&mut self, info: &PadAddedInfo, sink: ElementId, sink_pad: &str) -> PadAddedOutcome {
        let sink_core = match self.core(sink) {
            Ok(core) => core,
            Err(err) => return PadAddedOutcome::Failed(err),
        };
        let sink_pad_id = match sink_core.pad_id(sink_pad) {
            Ok(id) => id,
            Err(err) => return PadAddedOutcome::Failed(err),
        };
        if sink_core.peer(sink_pad_id).is_some() {
            debug!(sink = %sink_core.name(), pad = sink_pad, "already linked, ignoring new pad");
            return PadAddedOutcome::AlreadyLinked;
        }
        let announced_linked = self
            .element(info.element)
            .and_then(|e| e.pad(&info.pad))
            .is_some_and(|p| p.linked);
        if announced_linked {
            return PadAddedOutcome::AlreadyLinked;
        }

        let accepted = sink_core.query_caps(sink_pad_id).unwrap_or_else(Caps::new_any);
        if !info.caps.can_intersect(&accepted) {
            debug!(
                pad = %info.pad,
                announced = %info.caps,
                accepted = %accepted,
                "announced caps not accepted, ignoring"
            );
            return PadAddedOutcome::CapsMismatch {
                announced: info.caps.clone(),
                accepted,
            };
        }

        match self.link_pads(info.element, &info.pad, sink, sink_pad) {
            Ok(caps) => PadAddedOutcome::Linked(caps),
            Err(err) => {
                warn!(pad = %info.pad, error = %err, "linking announced pad failed");
                PadAddedOutcome::Failed(err)
            }
        }
    }
}
