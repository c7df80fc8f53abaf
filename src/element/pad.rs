//! Pads: the connection points of elements.
//!
//! Every pad is created from a [`PadTemplate`]. Templates with
//! [`PadPresence::Always`] produce pads when the element is built; the
//! element creates `Sometimes` pads itself while streaming, and the
//! application creates `Request` pads on demand.
//!
//! Pads live in a per-element arena indexed by [`PadId`]. A released pad
//! leaves a tombstone behind, so its id and name are never reused.

use crate::caps::Caps;
use std::collections::HashMap;
use std::sync::Weak;

use super::core::ElementCore;

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Produces data.
    Src,
    /// Consumes data.
    Sink,
}

impl std::fmt::Display for PadDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PadDirection::Src => "src",
            PadDirection::Sink => "sink",
        })
    }
}

/// When pads of a template exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadPresence {
    /// Created together with the element.
    Always,
    /// Created by the element at run time, e.g. when a demuxer finds a stream.
    Sometimes,
    /// Created when the application asks for one.
    Request,
}

impl std::fmt::Display for PadPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PadPresence::Always => "always",
            PadPresence::Sometimes => "sometimes",
            PadPresence::Request => "request",
        })
    }
}

/// Blueprint for pads of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PadTemplate {
    /// Name or pattern (`src`, `sink`, `src_%u`).
    pub name: String,
    /// Direction of pads created from it.
    pub direction: PadDirection,
    /// When such pads exist.
    pub presence: PadPresence,
    /// Formats pads of this template can handle.
    pub caps: Caps,
}

impl PadTemplate {
    /// Create a template.
    pub fn new(
        name: impl Into<String>,
        direction: PadDirection,
        presence: PadPresence,
        caps: Caps,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            presence,
            caps,
        }
    }

    /// Always-present `src` pad.
    pub fn src(caps: Caps) -> Self {
        Self::new("src", PadDirection::Src, PadPresence::Always, caps)
    }

    /// Always-present `sink` pad.
    pub fn sink(caps: Caps) -> Self {
        Self::new("sink", PadDirection::Sink, PadPresence::Always, caps)
    }

    /// Whether the name contains a `%u`/`%d` placeholder.
    pub fn is_pattern(&self) -> bool {
        self.name.contains("%u") || self.name.contains("%d")
    }

    /// Concrete pad name for the `index`-th pad of a pattern template.
    pub fn pad_name(&self, index: u32) -> String {
        self.name
            .replacen("%u", &index.to_string(), 1)
            .replacen("%d", &index.to_string(), 1)
    }
}

/// Index of a pad within its element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadId(pub(crate) u32);

impl PadId {
    /// Raw index.
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// The other end of a link.
#[derive(Debug, Clone)]
pub(crate) struct PadPeer {
    pub(crate) element: Weak<ElementCore>,
    pub(crate) pad: PadId,
}

/// A live pad.
#[derive(Debug)]
pub(crate) struct Pad {
    pub(crate) name: String,
    pub(crate) template: String,
    pub(crate) direction: PadDirection,
    pub(crate) presence: PadPresence,
    /// Caps the pad is committed to. Set by negotiation, or at creation for
    /// sometimes pads announced with a known format.
    pub(crate) caps: Option<Caps>,
    pub(crate) peer: Option<PadPeer>,
}

impl Pad {
    pub(crate) fn from_template(template: &PadTemplate, name: String, caps: Option<Caps>) -> Self {
        Self {
            name,
            template: template.name.clone(),
            direction: template.direction,
            presence: template.presence,
            caps,
            peer: None,
        }
    }

    pub(crate) fn info(&self, id: PadId) -> PadInfo {
        PadInfo {
            id,
            name: self.name.clone(),
            template: self.template.clone(),
            direction: self.direction,
            presence: self.presence,
            caps: self.caps.clone(),
            linked: self.peer.is_some(),
        }
    }
}

/// Arena slot. Released pads keep their name so that later use can be
/// reported as a misuse rather than as an unknown pad.
#[derive(Debug)]
pub(crate) enum PadSlot {
    Live(Pad),
    Released(String),
}

/// Per-element pad arena.
#[derive(Debug, Default)]
pub(crate) struct PadArena {
    slots: Vec<PadSlot>,
    /// Next index per pattern template, so names are never reused.
    counters: HashMap<String, u32>,
}

impl PadArena {
    pub(crate) fn add(&mut self, pad: Pad) -> PadId {
        let id = self.next_id();
        self.slots.push(PadSlot::Live(pad));
        id
    }

    /// Id the next added pad will get.
    pub(crate) fn next_id(&self) -> PadId {
        PadId(self.slots.len() as u32)
    }

    pub(crate) fn slot_by_name(&self, name: &str) -> Option<(PadId, &PadSlot)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, slot)| match slot {
                PadSlot::Live(p) => p.name == name,
                PadSlot::Released(n) => n == name,
            })
            .map(|(i, slot)| (PadId(i as u32), slot))
    }

    pub(crate) fn get(&self, id: PadId) -> Option<&Pad> {
        match self.slots.get(id.0 as usize)? {
            PadSlot::Live(p) => Some(p),
            PadSlot::Released(_) => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: PadId) -> Option<&mut Pad> {
        match self.slots.get_mut(id.0 as usize)? {
            PadSlot::Live(p) => Some(p),
            PadSlot::Released(_) => None,
        }
    }

    /// Replace a live pad with a tombstone.
    pub(crate) fn release(&mut self, id: PadId) -> Option<Pad> {
        let slot = self.slots.get_mut(id.0 as usize)?;
        let name = match slot {
            PadSlot::Live(p) => p.name.clone(),
            PadSlot::Released(_) => return None,
        };
        match std::mem::replace(slot, PadSlot::Released(name)) {
            PadSlot::Live(p) => Some(p),
            PadSlot::Released(_) => None,
        }
    }

    pub(crate) fn live(&self) -> impl Iterator<Item = (PadId, &Pad)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            PadSlot::Live(p) => Some((PadId(i as u32), p)),
            PadSlot::Released(_) => None,
        })
    }

    /// Reserve the next name for a pattern template.
    pub(crate) fn next_name(&mut self, template: &PadTemplate) -> String {
        let counter = self.counters.entry(template.name.clone()).or_insert(0);
        let name = template.pad_name(*counter);
        *counter += 1;
        name
    }
}

/// Snapshot of a pad, for introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct PadInfo {
    /// Pad id within the element.
    pub id: PadId,
    /// Pad name.
    pub name: String,
    /// Template the pad was created from.
    pub template: String,
    /// Direction.
    pub direction: PadDirection,
    /// Presence of its template.
    pub presence: PadPresence,
    /// Negotiated (or announced) caps.
    pub caps: Option<Caps>,
    /// Whether the pad has a peer.
    pub linked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_pattern() {
        let t = PadTemplate::new(
            "src_%u",
            PadDirection::Src,
            PadPresence::Request,
            Caps::new_any(),
        );
        assert!(t.is_pattern());
        assert_eq!(t.pad_name(3), "src_3");
        assert!(!PadTemplate::sink(Caps::new_any()).is_pattern());
    }

    #[test]
    fn test_arena_release_leaves_tombstone() {
        let template = PadTemplate::new(
            "src_%u",
            PadDirection::Src,
            PadPresence::Request,
            Caps::new_any(),
        );
        let mut arena = PadArena::default();
        let name = arena.next_name(&template);
        let a = arena.add(Pad::from_template(&template, name, None));
        let name = arena.next_name(&template);
        let b = arena.add(Pad::from_template(&template, name, None));
        assert_ne!(a, b);

        assert!(arena.release(a).is_some());
        assert!(arena.release(a).is_none());
        assert!(arena.get(a).is_none());
        assert!(matches!(
            arena.slot_by_name("src_0"),
            Some((_, PadSlot::Released(_)))
        ));
        assert_eq!(arena.live().count(), 1);
        assert_eq!(arena.next_name(&template), "src_2");
    }
}
