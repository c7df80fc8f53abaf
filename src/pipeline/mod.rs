//! Pipelines: owning containers that drive elements as one unit.
//!
//! A [`Pipeline`] owns its elements, records their links in a DAG,
//! aggregates their states into one pipeline state and owns the [`Bus`]
//! its elements post to. It is driven from one control thread: every
//! control call takes `&mut self`, while elements stream on their own
//! threads.
//!
//! - [`Pipeline::set_state`] walks all elements through the state machine.
//! - [`Pipeline::timed_pop_filtered`] drains the bus and, on the way,
//!   continues asynchronous state changes, runs pad-added handlers,
//!   aggregates end-of-stream and applies the error policy.
//! - [`Pipeline::request_pad`], [`Pipeline::release_pad`] and
//!   [`Pipeline::link_announced`] manage branches at run time.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediagraph::prelude::*;
//!
//! mediagraph::init();
//! let mut pipeline = mediagraph::parse_launch("testsrc num-buffers=30 ! fakesink")?;
//! pipeline.set_state(State::Playing)?;
//! let msg = pipeline.timed_pop_filtered(None, MessageType::EOS | MessageType::ERROR);
//! pipeline.set_state(State::Null)?;
//! ```

mod dynamic;
pub mod factory;
mod graph;
mod messages;
pub mod parser;
mod query;
mod state;

pub use dynamic::{HandlerId, PadAddedInfo, PadAddedOutcome};
pub use factory::{ElementConstructor, ElementFactory, FactoryInfo};
pub use graph::ElementId;
pub use parser::{ParsedElement, ParsedNode, ParsedPipeline, launch, parse_pipeline};
pub use query::SeekingInfo;

use crate::bus::Bus;
use crate::caps::Caps;
use crate::element::{Element, ElementCore, PadDirection, PadPeer, PadPresence, State};
use crate::error::{Error, MisuseError, Result};
use crate::negotiation::{self, PadCaps};
use crate::observability;
use dynamic::PadAddedHandler;
use graph::Graph;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

static PIPELINE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pipeline name. Generated (`pipeline0`, ...) when `None`.
    pub name: Option<String>,
    /// Take the pipeline to NULL when an element error is drained from the
    /// bus, before the error is handed to the caller.
    pub teardown_on_error: bool,
    /// Wait slice used by [`Pipeline::poll`].
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: None,
            teardown_on_error: true,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl PipelineConfig {
    /// Set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable teardown on error.
    pub fn with_teardown_on_error(mut self, teardown: bool) -> Self {
        self.teardown_on_error = teardown;
        self
    }

    /// Set the poll slice.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// A graph of elements driven as one unit.
pub struct Pipeline {
    name: String,
    config: PipelineConfig,
    graph: Graph,
    bus: Bus,
    /// Last state every element completed.
    current: State,
    /// State requested by the application.
    target: State,
    /// State of the step waiting for asynchronous elements.
    pending: Option<State>,
    async_waiting: HashSet<ElementId>,
    seek_pending: bool,
    /// Sequence number of the async-done that completes the pending seek.
    seek_done: Option<u64>,
    eos_sinks: HashSet<ElementId>,
    eos_posted: bool,
    duration_cache: Option<Option<crate::clock::ClockTime>>,
    handlers: Vec<(HandlerId, Option<ElementId>, PadAddedHandler)>,
    next_handler: u64,
    /// Drained messages the caller has not asked for yet.
    processed: VecDeque<crate::bus::Message>,
}

impl Pipeline {
    /// Create an empty pipeline with a generated name.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Create an empty pipeline called `name`.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::with_config(PipelineConfig::default().with_name(name))
    }

    /// Create an empty pipeline from settings.
    pub fn with_config(config: PipelineConfig) -> Self {
        let name = config.name.clone().unwrap_or_else(|| {
            format!("pipeline{}", PIPELINE_COUNTER.fetch_add(1, Ordering::Relaxed))
        });
        Self {
            name,
            config,
            graph: Graph::new(),
            bus: Bus::new(),
            current: State::Null,
            target: State::Null,
            pending: None,
            async_waiting: HashSet::new(),
            seek_pending: false,
            seek_done: None,
            eos_sinks: HashSet::new(),
            eos_posted: false,
            duration_cache: None,
            handlers: Vec::new(),
            next_handler: 0,
            processed: VecDeque::new(),
        }
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The bus elements post to.
    ///
    /// Reading the bus directly bypasses the pipeline's own handling
    /// (async continuation, pad-added handlers, EOS aggregation); pass such
    /// messages to [`Pipeline::handle_message`].
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    // Membership

    /// Adopt an element. Names must be unique within the pipeline.
    pub fn add(&mut self, element: Element) -> Result<ElementId> {
        if self.graph.contains_name(element.name()) {
            return Err(Error::DuplicateName(element.name().to_string()));
        }
        element.core().attach(&self.name, self.bus.clone())?;
        let id = self.graph.add(element);
        debug!(pipeline = %self.name, element = %self.element_name(id), "element added");
        Ok(id)
    }

    /// Adopt several elements.
    pub fn add_many(&mut self, elements: impl IntoIterator<Item = Element>) -> Result<Vec<ElementId>> {
        elements.into_iter().map(|e| self.add(e)).collect()
    }

    /// Take an element out of the pipeline.
    ///
    /// The element is set to NULL and unlinked. Its request pads must have
    /// been released first.
    pub fn remove(&mut self, id: ElementId) -> Result<Element> {
        let element = self.element_or_err(id)?.clone();
        let outstanding = element.core().request_pad_names();
        if !outstanding.is_empty() {
            return Err(MisuseError::RequestPadsOutstanding {
                element: element.name().to_string(),
                count: outstanding.len(),
            }
            .into());
        }
        element.core().seal();
        self.drive_element(id, State::Null)?;
        for pad in element.pads().into_iter().filter(|p| p.linked) {
            self.unlink_pad(id, &pad.name)?;
        }
        self.graph.remove(id);
        self.async_waiting.remove(&id);
        self.eos_sinks.remove(&id);
        self.handlers.retain(|(_, element, _)| *element != Some(id));
        element.core().detach();
        debug!(pipeline = %self.name, element = %element.name(), "element removed");
        // The removed element may have been the last one holding back a
        // pending step or the aggregated end-of-stream.
        self.finish_async_if_done();
        self.post_eos_if_complete();
        Ok(element)
    }

    /// An element by id.
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.graph.get(id)
    }

    /// An element id by name.
    pub fn by_name(&self, name: &str) -> Option<ElementId> {
        self.graph.find(name)
    }

    /// Id of an element handle, if it belongs to this pipeline.
    pub fn id_of(&self, element: &Element) -> Option<ElementId> {
        self.graph.find_element(element)
    }

    /// Ids of all elements, in insertion order.
    pub fn element_ids(&self) -> Vec<ElementId> {
        self.graph.ids()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Whether the pipeline has no elements.
    pub fn is_empty(&self) -> bool {
        self.graph.len() == 0
    }

    fn element_or_err(&self, id: ElementId) -> Result<&Element> {
        self.graph
            .get(id)
            .ok_or_else(|| Error::ElementNotFound(format!("#{}", id.index())))
    }

    fn element_name(&self, id: ElementId) -> String {
        self.graph
            .get(id)
            .map_or_else(|| format!("#{}", id.index()), |e| e.name().to_string())
    }

    fn core(&self, id: ElementId) -> Result<Arc<ElementCore>> {
        Ok(self.element_or_err(id)?.core().clone())
    }

    // Linking

    /// Link `src` to `sink`, picking free pads.
    ///
    /// An unlinked always pad is preferred; otherwise a pad is requested
    /// from a request template. If `src` only has a sometimes template the
    /// link is made once a pad appears, by a pad-added handler using
    /// [`Pipeline::link_announced`].
    pub fn link(&mut self, src: ElementId, sink: ElementId) -> Result<()> {
        self.link_with_pads(src, None, sink, None)
    }

    /// Link with optional pad names; `None` picks a free pad as
    /// [`Pipeline::link`] does.
    pub fn link_with_pads(
        &mut self,
        src: ElementId,
        src_pad: Option<&str>,
        sink: ElementId,
        sink_pad: Option<&str>,
    ) -> Result<()> {
        let (sink_pad, sink_requested) = match sink_pad {
            Some(pad) => (pad.to_string(), false),
            None => self
                .free_pad(sink, PadDirection::Sink)?
                .ok_or_else(|| Error::InvalidLink {
                    src: self.element_name(src),
                    sink: self.element_name(sink),
                    reason: "no free sink pad".into(),
                })?,
        };

        let src_choice = match src_pad {
            Some(pad) => Some((pad.to_string(), false)),
            None => self.free_pad(src, PadDirection::Src)?,
        };
        let Some((src_pad, src_requested)) = src_choice else {
            let has_sometimes = self.element_or_err(src)?.pad_templates().iter().any(|t| {
                t.direction == PadDirection::Src && t.presence == PadPresence::Sometimes
            });
            if !has_sometimes {
                if sink_requested {
                    self.release_pad(sink, &sink_pad)?;
                }
                return Err(Error::InvalidLink {
                    src: self.element_name(src),
                    sink: self.element_name(sink),
                    reason: "no free src pad".into(),
                });
            }
            debug!(
                pipeline = %self.name,
                src = %self.element_name(src),
                sink = %self.element_name(sink),
                "deferring link until a pad appears"
            );
            self.connect_pad_added(Some(src), move |pipeline, info| {
                let outcome = pipeline.link_announced(info, sink, &sink_pad);
                debug!(pad = %info.pad, ?outcome, "deferred link");
            });
            return Ok(());
        };

        match self.link_pads(src, &src_pad, sink, &sink_pad) {
            Ok(_) => Ok(()),
            Err(err) => {
                if src_requested {
                    self.release_pad(src, &src_pad)?;
                }
                if sink_requested {
                    self.release_pad(sink, &sink_pad)?;
                }
                Err(err)
            }
        }
    }

    /// A free pad of `direction`, requesting one if needed. The flag tells
    /// whether the pad was requested.
    fn free_pad(&mut self, id: ElementId, direction: PadDirection) -> Result<Option<(String, bool)>> {
        let element = self.element_or_err(id)?.clone();
        if let Some(pad) = element
            .pads()
            .into_iter()
            .find(|p| p.direction == direction && p.presence == PadPresence::Always && !p.linked)
        {
            return Ok(Some((pad.name, false)));
        }
        let template = element
            .pad_templates()
            .iter()
            .find(|t| t.direction == direction && t.presence == PadPresence::Request)
            .map(|t| t.name.clone());
        match template {
            Some(template) => Ok(Some((self.request_pad(id, &template)?, true))),
            None => Ok(None),
        }
    }

    /// Link two named pads and negotiate their caps.
    ///
    /// Fails without side effects if either pad is already linked, the
    /// directions do not match, the link would close a cycle, or the caps
    /// do not intersect. Returns the negotiated caps.
    pub fn link_pads(&mut self, src: ElementId, src_pad: &str, sink: ElementId, sink_pad: &str) -> Result<Caps> {
        let src_core = self.core(src)?;
        let sink_core = self.core(sink)?;
        let src_label = format!("{}.{}", src_core.name(), src_pad);
        let sink_label = format!("{}.{}", sink_core.name(), sink_pad);
        let invalid = |reason: &str| Error::InvalidLink {
            src: src_label.clone(),
            sink: sink_label.clone(),
            reason: reason.to_string(),
        };

        if src == sink {
            return Err(invalid("cannot link an element to itself"));
        }
        let src_id = src_core.pad_id(src_pad)?;
        let sink_id = sink_core.pad_id(sink_pad)?;
        let (src_info, sink_info) = match (src_core.pad_info(src_id), sink_core.pad_info(sink_id)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(invalid("pad disappeared")),
        };
        if src_info.direction != PadDirection::Src {
            return Err(invalid("upstream pad is not a src pad"));
        }
        if sink_info.direction != PadDirection::Sink {
            return Err(invalid("downstream pad is not a sink pad"));
        }
        for (core, info) in [(&src_core, &src_info), (&sink_core, &sink_info)] {
            if info.linked {
                return Err(MisuseError::PadAlreadyLinked {
                    element: core.name().to_string(),
                    pad: info.name.clone(),
                }
                .into());
            }
        }

        let src_accepted = src_core.query_caps(src_id).unwrap_or_else(Caps::new_any);
        let sink_accepted = sink_core.query_caps(sink_id).unwrap_or_else(Caps::new_any);
        let src_fixed = src_core.announced_caps(src_id);
        let sink_fixed = sink_core.announced_caps(sink_id);
        let a = PadCaps::new(&src_label, &src_accepted).with_fixed(src_fixed.as_ref());
        let b = PadCaps::new(&sink_label, &sink_accepted).with_fixed(sink_fixed.as_ref());
        let caps = negotiation::negotiate(&a, &b).inspect_err(|err| {
            observability::record_negotiation_failure(&src_label, &sink_label);
            debug!(src = %src_label, sink = %sink_label, error = %err, "negotiation failed");
        })?;

        self.graph
            .add_link(src, sink)
            .map_err(|_| invalid("link would create a cycle"))?;

        // Downstream first, so data pushed as soon as the src side is set
        // finds a complete link.
        sink_core.set_link(
            sink_id,
            PadPeer {
                element: Arc::downgrade(&src_core),
                pad: src_id,
            },
            caps.clone(),
        );
        src_core.set_link(
            src_id,
            PadPeer {
                element: Arc::downgrade(&sink_core),
                pad: sink_id,
            },
            caps.clone(),
        );
        info!(src = %src_label, sink = %sink_label, caps = %caps, "linked");
        Ok(caps)
    }

    /// Unlink two named pads.
    pub fn unlink_pads(&mut self, src: ElementId, src_pad: &str, sink: ElementId, sink_pad: &str) -> Result<()> {
        let src_core = self.core(src)?;
        let sink_core = self.core(sink)?;
        let src_id = src_core.pad_id(src_pad)?;
        let sink_id = sink_core.pad_id(sink_pad)?;
        let connected = src_core.peer(src_id).is_some_and(|peer| {
            peer.pad == sink_id && peer.element.upgrade().is_some_and(|c| Arc::ptr_eq(&c, &sink_core))
        });
        if !connected {
            return Err(MisuseError::PadNotLinked {
                element: src_core.name().to_string(),
                pad: src_pad.to_string(),
            }
            .into());
        }
        src_core.clear_link(src_id);
        sink_core.clear_link(sink_id);
        self.graph.remove_link(src, sink);
        debug!(
            src = %format!("{}.{}", src_core.name(), src_pad),
            sink = %format!("{}.{}", sink_core.name(), sink_pad),
            "unlinked"
        );
        Ok(())
    }

    /// Unlink `pad` of element `id` from whatever it is linked to.
    pub fn unlink_pad(&mut self, id: ElementId, pad: &str) -> Result<()> {
        let core = self.core(id)?;
        let pad_id = core.pad_id(pad)?;
        let info = core.pad_info(pad_id);
        let peer = core.peer(pad_id);
        let (Some(info), Some(peer)) = (info, peer) else {
            return Err(MisuseError::PadNotLinked {
                element: core.name().to_string(),
                pad: pad.to_string(),
            }
            .into());
        };
        let peer_core = peer.element.upgrade();
        let peer_element = peer_core
            .as_ref()
            .and_then(|c| self.graph.find(c.name()))
            .filter(|pid| {
                self.graph
                    .get(*pid)
                    .zip(peer_core.as_ref())
                    .is_some_and(|(e, c)| Arc::ptr_eq(e.core(), c))
            });
        let peer_pad = peer_core.as_ref().and_then(|c| c.pad_info(peer.pad));
        match (peer_element, peer_pad) {
            (Some(peer_id), Some(peer_pad)) => match info.direction {
                PadDirection::Src => self.unlink_pads(id, pad, peer_id, &peer_pad.name),
                PadDirection::Sink => self.unlink_pads(peer_id, &peer_pad.name, id, pad),
            },
            _ => {
                // The peer is gone or belongs elsewhere; only our side is left.
                warn!(element = %core.name(), pad, "peer not in pipeline, clearing link");
                core.clear_link(pad_id);
                Ok(())
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("elements", &self.graph.len())
            .field("current", &self.current)
            .field("target", &self.target)
            .field("pending", &self.pending)
            .finish()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let ids = self.graph.ids();
        for id in &ids {
            if let Some(element) = self.graph.get(*id) {
                element.core().seal();
            }
        }
        if let Err(err) = self.set_state(State::Null) {
            warn!(pipeline = %self.name, error = %err, "error while shutting down");
        }
        for id in ids {
            let Some(element) = self.graph.get(id).cloned() else {
                continue;
            };
            for pad in element.core().request_pad_names() {
                let linked = element.pad(&pad).is_some_and(|p| p.linked);
                if linked {
                    if let Err(err) = self.unlink_pad(id, &pad) {
                        warn!(element = %element.name(), pad = %pad, error = %err, "unlink failed");
                    }
                }
                if let Err(err) = element.core().release_pad(&pad) {
                    warn!(element = %element.name(), pad = %pad, error = %err, "release failed");
                }
            }
        }
        for id in self.graph.ids() {
            if let Some(element) = self.graph.remove(id) {
                element.core().detach();
            }
        }
        self.bus.set_flushing(true);
    }
}
