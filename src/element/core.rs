//! Framework side of an element: pads, state and data routing.
//!
//! [`ElementCore`] wraps one [`ElementImpl`]. It owns the element's pad
//! arena, tracks its state and gates the data flowing into it:
//!
//! - below PAUSED, or while flushing, buffers are refused with
//!   [`FlowError::Flushing`];
//! - a sink in PAUSED accepts one buffer (preroll) and then blocks the
//!   streaming thread until it goes to PLAYING, starts flushing or drops
//!   below PAUSED;
//! - a sink whose READY to PAUSED transition returned
//!   [`StateChangeSuccess::Async`] completes it on that first buffer and
//!   posts async-done.
//!
//! Peers are reached through weak references only, so a streaming thread
//! never keeps a removed element alive.

use super::context::ElementContext;
use super::pad::{Pad, PadArena, PadDirection, PadId, PadInfo, PadPeer, PadPresence, PadSlot, PadTemplate};
use super::property::{PropertySpec, PropertyValue};
use super::state::{State, StateChange, StateChangeSuccess};
use super::traits::{ElementImpl, FlowError, FlowResult};
use crate::buffer::Buffer;
use crate::bus::{Bus, Message, MessageBody, MessageSource};
use crate::caps::Caps;
use crate::error::{Error, MisuseError, Result};
use crate::event::{Event, Query};
use crate::observability::{self, ElementMetrics};
use std::fmt;
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::time::Instant;
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
struct StateCell {
    current: State,
    /// Set while an asynchronous READY to PAUSED transition is in progress.
    pending: Option<State>,
    flushing: bool,
    prerolled: bool,
    eos: bool,
    /// A flush happened in PAUSED/PLAYING; the next buffer posts async-done.
    async_reset: bool,
    /// The element is being removed or disposed.
    sealed: bool,
}

pub(crate) struct ElementCore {
    name: String,
    factory: String,
    imp: Box<dyn ElementImpl>,
    templates: Vec<PadTemplate>,
    properties: Vec<PropertySpec>,
    is_sink: bool,
    is_source: bool,
    pads: RwLock<PadArena>,
    state: Mutex<StateCell>,
    cond: Condvar,
    bus: RwLock<Option<Bus>>,
    parent: Mutex<Option<String>>,
    metrics: ElementMetrics,
    self_ref: Weak<ElementCore>,
}

impl ElementCore {
    fn new(factory: &str, name: &str, imp: Box<dyn ElementImpl>) -> Arc<Self> {
        let templates = imp.pad_templates();
        let properties = imp.properties();
        let has_src = templates.iter().any(|t| t.direction == PadDirection::Src);
        let has_sink = templates.iter().any(|t| t.direction == PadDirection::Sink);

        let mut arena = PadArena::default();
        for template in templates.iter().filter(|t| t.presence == PadPresence::Always) {
            arena.add(Pad::from_template(template, template.name.clone(), None));
        }

        Arc::new_cyclic(|self_ref| ElementCore {
            name: name.to_string(),
            factory: factory.to_string(),
            imp,
            templates,
            properties,
            is_sink: has_sink && !has_src,
            is_source: has_src && !has_sink,
            pads: RwLock::new(arena),
            state: Mutex::new(StateCell::default()),
            cond: Condvar::new(),
            bus: RwLock::new(None),
            parent: Mutex::new(None),
            metrics: ElementMetrics::new(name),
            self_ref: self_ref.clone(),
        })
    }

    fn cell(&self) -> MutexGuard<'_, StateCell> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pads(&self) -> RwLockReadGuard<'_, PadArena> {
        self.pads.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn pads_mut(&self) -> RwLockWriteGuard<'_, PadArena> {
        self.pads.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_sink(&self) -> bool {
        self.is_sink
    }

    pub(crate) fn is_source(&self) -> bool {
        self.is_source
    }

    pub(crate) fn context(&self) -> ElementContext {
        ElementContext::new(self.self_ref.clone(), self.name.clone())
    }

    fn weak(&self) -> ElementWeak {
        ElementWeak(self.self_ref.clone())
    }

    pub(crate) fn template(&self, name: &str) -> Option<&PadTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    // Messages

    pub(crate) fn post(&self, body: MessageBody) {
        let bus = self
            .bus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match bus {
            Some(bus) => {
                let src = MessageSource::Element {
                    name: self.name.clone(),
                    element: self.weak(),
                };
                bus.post(Message::new(src, body));
            }
            None => trace!(element = %self.name, ?body, "no bus, message dropped"),
        }
    }

    pub(crate) fn attach(&self, pipeline: &str, bus: Bus) -> Result<()> {
        let mut parent = self.parent.lock().unwrap_or_else(PoisonError::into_inner);
        if parent.is_some() {
            return Err(MisuseError::AlreadyInPipeline(self.name.clone()).into());
        }
        *parent = Some(pipeline.to_string());
        *self.bus.write().unwrap_or_else(PoisonError::into_inner) = Some(bus);
        self.cell().sealed = false;
        Ok(())
    }

    pub(crate) fn detach(&self) {
        *self.parent.lock().unwrap_or_else(PoisonError::into_inner) = None;
        *self.bus.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn parent(&self) -> Option<String> {
        self.parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop handing out request pads.
    pub(crate) fn seal(&self) {
        self.cell().sealed = true;
    }

    // Properties

    fn property_spec(&self, name: &str) -> Result<&PropertySpec> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::UnknownProperty {
                element: self.name.clone(),
                property: name.to_string(),
            })
    }

    pub(crate) fn set_property(&self, name: &str, value: PropertyValue) -> Result<()> {
        let spec = self.property_spec(name)?;
        if !spec.writable {
            return Err(Error::PropertyNotWritable {
                element: self.name.clone(),
                property: name.to_string(),
            });
        }
        let coerced = value.coerce(spec.kind).ok_or_else(|| Error::TypeMismatch {
            property: name.to_string(),
            expected: spec.kind,
            found: value.describe(),
        })?;
        debug!(element = %self.name, property = name, value = %coerced, "set property");
        self.imp
            .set_property(name, &coerced)
            .map_err(|err| match err {
                Error::UnknownProperty { property, .. } => Error::UnknownProperty {
                    element: self.name.clone(),
                    property,
                },
                Error::InvalidValue { property, reason, .. } => Error::InvalidValue {
                    element: self.name.clone(),
                    property,
                    reason,
                },
                other => other,
            })
    }

    pub(crate) fn property(&self, name: &str) -> Option<PropertyValue> {
        let spec = self.property_spec(name).ok()?;
        self.imp.property(name).or_else(|| spec.default.clone())
    }

    pub(crate) fn set_uri(&self, uri: &str) -> Result<()> {
        debug!(element = %self.name, uri, "set uri");
        self.imp.set_uri(uri)
    }

    fn check_required(&self) -> Result<()> {
        for spec in self.properties.iter().filter(|p| p.required) {
            if self.imp.property(spec.name).is_none() {
                return Err(Error::StateChange {
                    element: self.name.clone(),
                    reason: format!("required property '{}' is not set", spec.name),
                });
            }
        }
        Ok(())
    }

    // Pads

    pub(crate) fn pad_id(&self, name: &str) -> Result<PadId> {
        match self.pads().slot_by_name(name) {
            Some((id, PadSlot::Live(_))) => Ok(id),
            Some((_, PadSlot::Released(_))) => Err(MisuseError::PadAlreadyReleased {
                element: self.name.clone(),
                pad: name.to_string(),
            }
            .into()),
            None => Err(Error::PadNotFound {
                element: self.name.clone(),
                pad: name.to_string(),
            }),
        }
    }

    pub(crate) fn pad_info(&self, id: PadId) -> Option<PadInfo> {
        self.pads().get(id).map(|p| p.info(id))
    }

    pub(crate) fn pad_infos(&self) -> Vec<PadInfo> {
        self.pads().live().map(|(id, p)| p.info(id)).collect()
    }

    fn pad_name(&self, id: PadId) -> Option<String> {
        self.pads().get(id).map(|p| p.name.clone())
    }

    pub(crate) fn src_pad_names(&self) -> Vec<String> {
        self.pads()
            .live()
            .filter(|(_, p)| p.direction == PadDirection::Src)
            .map(|(_, p)| p.name.clone())
            .collect()
    }

    pub(crate) fn linked_src_pad_names(&self) -> Vec<String> {
        self.pads()
            .live()
            .filter(|(_, p)| p.direction == PadDirection::Src && p.peer.is_some())
            .map(|(_, p)| p.name.clone())
            .collect()
    }

    pub(crate) fn request_pad_names(&self) -> Vec<String> {
        self.pads()
            .live()
            .filter(|(_, p)| p.presence == PadPresence::Request)
            .map(|(_, p)| p.name.clone())
            .collect()
    }

    /// Formats `pad` can handle right now.
    pub(crate) fn query_caps(&self, id: PadId) -> Option<Caps> {
        let (name, template) = {
            let pads = self.pads();
            let pad = pads.get(id)?;
            (pad.name.clone(), pad.template.clone())
        };
        let template = self.template(&template)?;
        Some(self.imp.query_caps(&name, template))
    }

    /// Caps a sometimes pad was announced with. Such pads are pinned.
    pub(crate) fn announced_caps(&self, id: PadId) -> Option<Caps> {
        let pads = self.pads();
        let pad = pads.get(id)?;
        if pad.presence == PadPresence::Sometimes {
            pad.caps.clone()
        } else {
            None
        }
    }

    pub(crate) fn peer(&self, id: PadId) -> Option<PadPeer> {
        self.pads().get(id).and_then(|p| p.peer.clone())
    }

    pub(crate) fn set_link(&self, id: PadId, peer: PadPeer, caps: Caps) {
        if let Some(pad) = self.pads_mut().get_mut(id) {
            pad.peer = Some(peer);
            pad.caps = Some(caps);
        }
        self.links_changed();
    }

    /// Forget the peer. Caps negotiated for the link are dropped, announced
    /// caps of sometimes pads are kept.
    pub(crate) fn clear_link(&self, id: PadId) {
        if let Some(pad) = self.pads_mut().get_mut(id) {
            pad.peer = None;
            if pad.presence != PadPresence::Sometimes {
                pad.caps = None;
            }
        }
        self.links_changed();
    }

    /// Wake threads blocked in [`ElementCore::wait_linked`]. The state lock
    /// is taken so a waiter between its check and its wait is not missed.
    fn links_changed(&self) {
        let _cell = self.cell();
        self.cond.notify_all();
    }

    /// Block until at least `count` src pads have a peer or `deadline`
    /// passes. Fails with `flushing` if the element stops streaming first.
    pub(crate) fn wait_linked(&self, count: usize, deadline: Instant) -> FlowResult {
        let mut cell = self.cell();
        loop {
            if cell.flushing || cell.current < State::Paused {
                return Err(FlowError::Flushing);
            }
            if self.linked_src_pad_names().len() >= count {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            cell = self
                .cond
                .wait_timeout(cell, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub(crate) fn request_pad(&self, template_name: &str) -> Result<PadInfo> {
        if self.cell().sealed {
            return Err(MisuseError::ElementSealed(self.name.clone()).into());
        }
        let template = self
            .template(template_name)
            .ok_or_else(|| Error::PadTemplateNotFound {
                element: self.name.clone(),
                template: template_name.to_string(),
            })?
            .clone();
        if template.presence != PadPresence::Request {
            return Err(MisuseError::NotRequestTemplate {
                element: self.name.clone(),
                template: template_name.to_string(),
            }
            .into());
        }

        let name = if template.is_pattern() {
            self.pads_mut().next_name(&template)
        } else if self.pads().slot_by_name(&template.name).is_some() {
            return Err(Error::InstantiationFailed {
                factory: self.factory.clone(),
                reason: format!("request pad '{}' already exists", template.name),
            });
        } else {
            template.name.clone()
        };

        // The implementation may allocate per-pad state; it must not see
        // our pad lock held.
        self.imp.request_pad(&self.context(), &template, &name)?;

        let pad = Pad::from_template(&template, name, None);
        let mut pads = self.pads_mut();
        let info = pad.info(pads.next_id());
        pads.add(pad);
        debug!(element = %self.name, pad = %info.name, "request pad created");
        Ok(info)
    }

    pub(crate) fn release_pad(&self, name: &str) -> Result<()> {
        let id = {
            let pads = self.pads();
            match pads.slot_by_name(name) {
                None => {
                    return Err(Error::PadNotFound {
                        element: self.name.clone(),
                        pad: name.to_string(),
                    });
                }
                Some((_, PadSlot::Released(_))) => {
                    return Err(MisuseError::PadAlreadyReleased {
                        element: self.name.clone(),
                        pad: name.to_string(),
                    }
                    .into());
                }
                Some((id, PadSlot::Live(pad))) => {
                    if pad.presence != PadPresence::Request {
                        return Err(MisuseError::NotRequestPad {
                            element: self.name.clone(),
                            pad: name.to_string(),
                        }
                        .into());
                    }
                    if pad.peer.is_some() {
                        return Err(MisuseError::PadAlreadyLinked {
                            element: self.name.clone(),
                            pad: name.to_string(),
                        }
                        .into());
                    }
                    id
                }
            }
        };
        self.pads_mut().release(id);
        self.imp.release_pad(&self.context(), name);
        debug!(element = %self.name, pad = name, "request pad released");
        Ok(())
    }

    pub(crate) fn add_sometimes_pad(&self, template_name: &str, caps: Caps) -> Result<String> {
        let template = self
            .template(template_name)
            .filter(|t| t.presence == PadPresence::Sometimes)
            .ok_or_else(|| Error::PadTemplateNotFound {
                element: self.name.clone(),
                template: template_name.to_string(),
            })?
            .clone();

        let (name, id) = {
            let mut pads = self.pads_mut();
            let name = if template.is_pattern() {
                pads.next_name(&template)
            } else {
                template.name.clone()
            };
            let id = pads.add(Pad::from_template(&template, name.clone(), Some(caps.clone())));
            (name, id)
        };
        debug!(element = %self.name, pad = %name, caps = %caps, "announcing pad");
        self.post(MessageBody::PadAdded {
            pad: name.clone(),
            pad_id: id,
            caps,
        });
        Ok(name)
    }

    // Data flow

    fn peer_of(&self, pad: &str) -> std::result::Result<(Arc<ElementCore>, PadId), FlowError> {
        let peer = {
            let pads = self.pads();
            match pads.slot_by_name(pad) {
                Some((_, PadSlot::Live(p))) if p.direction == PadDirection::Src => p.peer.clone(),
                _ => None,
            }
        };
        let peer = peer.ok_or(FlowError::NotLinked)?;
        let core = peer.element.upgrade().ok_or(FlowError::NotLinked)?;
        Ok((core, peer.pad))
    }

    pub(crate) fn push(&self, pad: &str, buffer: Buffer) -> FlowResult {
        let (peer, peer_pad) = self.peer_of(pad)?;
        self.metrics.record_push(buffer.len());
        peer.receive_buffer(peer_pad, buffer)
    }

    pub(crate) fn push_event(&self, pad: &str, event: Event) -> bool {
        match self.peer_of(pad) {
            Ok((peer, peer_pad)) => peer.receive_event(peer_pad, event),
            Err(_) => false,
        }
    }

    /// Block or refuse data according to state. `Ok` means the data may be
    /// processed now.
    fn wait_for_data(&self) -> FlowResult {
        let mut cell = self.cell();
        loop {
            if cell.flushing {
                return Err(FlowError::Flushing);
            }
            if cell.eos {
                return Err(FlowError::Eos);
            }
            if cell.current < State::Paused && cell.pending != Some(State::Paused) {
                return Err(FlowError::Flushing);
            }
            if !self.is_sink {
                return Ok(());
            }
            if cell.current == State::Playing {
                if std::mem::take(&mut cell.async_reset) {
                    drop(cell);
                    self.post(MessageBody::AsyncDone);
                }
                return Ok(());
            }
            if !cell.prerolled {
                cell.prerolled = true;
                if cell.pending == Some(State::Paused) {
                    cell.current = State::Paused;
                    cell.pending = None;
                    cell.async_reset = false;
                    drop(cell);
                    self.cond.notify_all();
                    debug!(element = %self.name, "prerolled, async state change complete");
                    self.committed(StateChange::READY_TO_PAUSED);
                    self.post(MessageBody::AsyncDone);
                } else if std::mem::take(&mut cell.async_reset) {
                    drop(cell);
                    self.post(MessageBody::AsyncDone);
                }
                return Ok(());
            }
            trace!(element = %self.name, "prerolled, blocking");
            cell = self
                .cond
                .wait(cell)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn receive_buffer(&self, pad: PadId, buffer: Buffer) -> FlowResult {
        let name = self.pad_name(pad).ok_or(FlowError::NotLinked)?;
        self.wait_for_data()?;
        self.imp.chain(&self.context(), &name, buffer)
    }

    fn receive_event(&self, pad: PadId, event: Event) -> bool {
        let Some(name) = self.pad_name(pad) else {
            return false;
        };
        trace!(element = %self.name, pad = %name, event = event.name(), "event");
        let is_eos = matches!(event, Event::Eos);
        match event {
            Event::FlushStart => {
                self.cell().flushing = true;
                self.cond.notify_all();
            }
            Event::FlushStop => {
                let mut cell = self.cell();
                cell.flushing = false;
                cell.eos = false;
                if self.is_sink && (cell.current >= State::Paused || cell.pending.is_some()) {
                    if cell.current == State::Paused || cell.pending.is_some() {
                        cell.prerolled = false;
                    }
                    cell.async_reset = true;
                }
            }
            Event::Eos => {
                if self.wait_for_data().is_err() {
                    return false;
                }
            }
            Event::Seek(_) => return false,
        }

        let handled = self.imp.sink_event(&self.context(), &name, event);
        if is_eos {
            self.cell().eos = true;
            if self.is_sink {
                debug!(element = %self.name, "end of stream");
                self.post(MessageBody::Eos);
            }
        }
        handled
    }

    // State

    pub(crate) fn current_state(&self) -> State {
        self.cell().current
    }

    pub(crate) fn pending_state(&self) -> Option<State> {
        self.cell().pending
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.cell().flushing
    }

    fn committed(&self, transition: StateChange) {
        observability::record_state_change(&self.name, transition);
        observability::trace_state_change(&self.name, transition.from.name(), transition.to.name());
        self.post(MessageBody::StateChanged {
            old: transition.from,
            new: transition.to,
            pending: None,
        });
    }

    /// Perform one single-step transition.
    ///
    /// Downward transitions never fail: the state is lowered before the
    /// implementation runs so that blocked streaming threads bail out, and
    /// implementation errors are only logged.
    pub(crate) fn change_state(&self, transition: StateChange) -> Result<StateChangeSuccess> {
        let ctx = self.context();
        if !transition.is_upward() {
            {
                let mut cell = self.cell();
                cell.current = transition.to;
                cell.pending = None;
                if transition.to < State::Paused {
                    cell.prerolled = false;
                }
            }
            self.cond.notify_all();
            if let Err(err) = self.imp.change_state(&ctx, transition) {
                warn!(element = %self.name, %transition, error = %err, "error during downward state change");
            }
            self.committed(transition);
            return Ok(StateChangeSuccess::Success);
        }

        if transition == StateChange::NULL_TO_READY {
            self.check_required()?;
        }
        if transition == StateChange::READY_TO_PAUSED {
            let mut cell = self.cell();
            cell.prerolled = false;
            cell.eos = false;
            cell.flushing = false;
            cell.async_reset = false;
        }

        let result = self
            .imp
            .change_state(&ctx, transition)
            .map_err(|err| match err {
                Error::StateChange { .. } => err,
                other => Error::StateChange {
                    element: self.name.clone(),
                    reason: other.to_string(),
                },
            })?;

        if result == StateChangeSuccess::Async {
            if transition == StateChange::READY_TO_PAUSED && self.is_sink {
                self.cell().pending = Some(State::Paused);
                debug!(element = %self.name, "waiting for preroll");
                return Ok(StateChangeSuccess::Async);
            }
            warn!(element = %self.name, %transition, "only sinks can change state asynchronously");
        }

        {
            let mut cell = self.cell();
            cell.current = transition.to;
            cell.pending = None;
        }
        self.cond.notify_all();
        self.committed(transition);
        Ok(StateChangeSuccess::Success)
    }

    /// Cancel an asynchronous READY to PAUSED transition.
    pub(crate) fn abort_async(&self) {
        let aborted = self.cell().pending.take().is_some();
        if !aborted {
            return;
        }
        self.cond.notify_all();
        debug!(element = %self.name, "async state change aborted");
        if let Err(err) = self.imp.change_state(&self.context(), StateChange::PAUSED_TO_READY) {
            warn!(element = %self.name, error = %err, "error while aborting state change");
        }
    }

    // Upstream

    pub(crate) fn src_event(&self, event: Event) -> bool {
        self.imp.src_event(&self.context(), event)
    }

    pub(crate) fn query(&self, query: &mut Query) -> bool {
        self.imp.query(&self.context(), query)
    }
}

impl fmt::Debug for ElementCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementCore")
            .field("name", &self.name)
            .field("factory", &self.factory)
            .field("state", &*self.cell())
            .finish()
    }
}

/// Handle to an element.
///
/// Cloning is cheap and clones refer to the same element. Elements are
/// created by an [`crate::pipeline::ElementFactory`] (or directly with
/// [`Element::new`] for custom implementations) and then adopted by one
/// [`crate::pipeline::Pipeline`].
#[derive(Clone)]
pub struct Element {
    core: Arc<ElementCore>,
}

impl Element {
    /// Wrap an implementation. `factory` is the kind name reported by
    /// [`Element::factory_name`].
    pub fn new(factory: &str, name: &str, imp: impl ElementImpl) -> Self {
        Self::from_boxed(factory, name, Box::new(imp))
    }

    pub(crate) fn from_boxed(factory: &str, name: &str, imp: Box<dyn ElementImpl>) -> Self {
        Self {
            core: ElementCore::new(factory, name, imp),
        }
    }

    pub(crate) fn core(&self) -> &Arc<ElementCore> {
        &self.core
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Name of the factory that built this element.
    pub fn factory_name(&self) -> &str {
        &self.core.factory
    }

    /// Set a property. The value is coerced to the declared type.
    pub fn set_property(&self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        self.core.set_property(name, value.into())
    }

    /// Current value of a property, falling back to its default. `None`
    /// for unknown properties and for unset properties without a default.
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.core.property(name)
    }

    /// Pad templates.
    pub fn pad_templates(&self) -> &[PadTemplate] {
        &self.core.templates
    }

    /// Declared properties.
    pub fn properties(&self) -> &[PropertySpec] {
        &self.core.properties
    }

    /// Live pads, in creation order.
    pub fn pads(&self) -> Vec<PadInfo> {
        self.core.pad_infos()
    }

    /// A live pad by name.
    pub fn pad(&self, name: &str) -> Option<PadInfo> {
        let id = self.core.pad_id(name).ok()?;
        self.core.pad_info(id)
    }

    /// Formats `pad` can currently handle.
    pub fn query_caps(&self, pad: &str) -> Result<Caps> {
        let id = self.core.pad_id(pad)?;
        self.core.query_caps(id).ok_or_else(|| Error::PadNotFound {
            element: self.core.name.clone(),
            pad: pad.to_string(),
        })
    }

    /// Last completed state.
    pub fn current_state(&self) -> State {
        self.core.current_state()
    }

    /// State being reached asynchronously, if any.
    pub fn pending_state(&self) -> Option<State> {
        self.core.pending_state()
    }

    /// Ask the element directly. Returns `true` if it answered.
    pub fn query(&self, query: &mut Query) -> bool {
        self.core.query(query)
    }

    /// Send an upstream event (seek) to this element.
    pub fn send_event(&self, event: Event) -> bool {
        self.core.src_event(event)
    }

    /// Name of the owning pipeline.
    pub fn parent(&self) -> Option<String> {
        self.core.parent()
    }

    /// Whether the element only consumes data.
    pub fn is_sink(&self) -> bool {
        self.core.is_sink
    }

    /// Whether the element only produces data.
    pub fn is_source(&self) -> bool {
        self.core.is_source
    }

    /// Non-owning reference.
    pub fn downgrade(&self) -> ElementWeak {
        ElementWeak(Arc::downgrade(&self.core))
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.core.name)
            .field("factory", &self.core.factory)
            .field("state", &self.current_state())
            .finish()
    }
}

/// Weak reference to an element, as carried by bus messages.
#[derive(Clone, Debug, Default)]
pub struct ElementWeak(Weak<ElementCore>);

impl ElementWeak {
    /// The element, if it still exists.
    pub fn upgrade(&self) -> Option<Element> {
        self.0.upgrade().map(|core| Element { core })
    }
}
