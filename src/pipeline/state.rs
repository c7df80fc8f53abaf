//! Pipeline state machine.
//!
//! The pipeline walks one state at a time toward its target. Each step
//! switches every element, downstream elements first, so that a streaming
//! thread blocked in a sink is released before its producer stops. A step
//! completes when every element did; sinks that preroll asynchronously
//! leave the step pending until their async-done is drained from the bus.

use super::{ElementId, Pipeline};
use crate::bus::{Message, MessageBody, MessageSource, MessageType};
use crate::element::{Element, State, StateChange, StateChangeSuccess};
use crate::error::{Error, MisuseError, Result};
use crate::observability;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

impl Pipeline {
    /// Request a state.
    ///
    /// Returns [`StateChangeSuccess::Async`] if some sink is still
    /// prerolling; the change then completes while the bus is drained
    /// through [`Pipeline::timed_pop_filtered`]. On failure the elements
    /// switched in the failing step are rolled back and the pipeline stays
    /// in its last completed state.
    pub fn set_state(&mut self, target: State) -> Result<StateChangeSuccess> {
        let _span = observability::span_pipeline(&self.name).entered();
        if let Some(pending) = self.pending {
            if target == self.target {
                return Ok(StateChangeSuccess::Async);
            }
            if target > self.current {
                return Err(MisuseError::AsyncInProgress {
                    pending,
                    requested: target,
                }
                .into());
            }
            self.cancel_async();
        } else if target == self.current {
            self.target = target;
            return Ok(StateChangeSuccess::Success);
        }

        info!(pipeline = %self.name, from = %self.current, to = %target, "setting state");
        self.target = target;
        if target < State::Paused {
            self.seek_pending = false;
            self.seek_done = None;
        }
        self.continue_walk()
    }

    /// Last state every element completed.
    pub fn current_state(&self) -> State {
        self.current
    }

    /// State being reached asynchronously, if any.
    pub fn pending_state(&self) -> Option<State> {
        self.pending
    }

    /// State last requested with [`Pipeline::set_state`].
    pub fn target_state(&self) -> State {
        self.target
    }

    /// Drain the bus until the pending state change completes.
    ///
    /// Returns the state reached, [`Error::Timeout`] if `timeout` expires
    /// first, or the element error that interrupted the change.
    pub fn wait_state(&mut self, timeout: Option<Duration>) -> Result<State> {
        let deadline = timeout.map(|t| Instant::now() + t);
        while self.pending.is_some() {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Err(Error::Timeout);
            }
            match self.timed_pop_filtered(remaining, MessageType::ERROR | MessageType::ASYNC_DONE) {
                Some(msg) => {
                    if let MessageBody::Error { error, .. } = msg.body() {
                        return Err(Error::StateChange {
                            element: msg.src_name().to_string(),
                            reason: error.clone(),
                        });
                    }
                }
                None => {
                    if self.pending.is_some() {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
        Ok(self.current)
    }

    /// Bring one element to the state of the pipeline, for elements added
    /// while it is running.
    pub fn sync_state_with_parent(&mut self, id: ElementId) -> Result<StateChangeSuccess> {
        let target = self.pending.unwrap_or(self.current);
        let result = self.drive_element(id, target)?;
        if result == StateChangeSuccess::Async && self.pending.is_some() {
            self.async_waiting.insert(id);
        }
        debug!(pipeline = %self.name, element = %self.element_name(id), state = %target, ?result, "synced with parent");
        Ok(result)
    }

    /// Walk toward the target until done, pending or failed.
    pub(super) fn continue_walk(&mut self) -> Result<StateChangeSuccess> {
        while self.current != self.target {
            let next = self.current.next_toward(self.target);
            let transition = StateChange::new(self.current, next);
            match self.step(transition) {
                Ok(StateChangeSuccess::Success) => self.commit_step(transition),
                Ok(StateChangeSuccess::Async) => {
                    self.pending = Some(next);
                    debug!(
                        pipeline = %self.name,
                        %transition,
                        waiting = self.async_waiting.len(),
                        "state change pending"
                    );
                    return Ok(StateChangeSuccess::Async);
                }
                Err(err) => {
                    warn!(pipeline = %self.name, %transition, error = %err, "state change failed");
                    self.target = self.current;
                    return Err(err);
                }
            }
        }
        Ok(StateChangeSuccess::Success)
    }

    /// Switch every element for one transition.
    fn step(&mut self, transition: StateChange) -> Result<StateChangeSuccess> {
        let mut switched = Vec::new();
        let mut waiting = Vec::new();
        for id in self.graph.sinks_first() {
            let Some(element) = self.graph.get(id).cloned() else {
                continue;
            };
            let state = element.current_state();
            let needed = if transition.is_upward() {
                state < transition.to
            } else {
                state > transition.to
            };
            if !needed && element.pending_state().is_none() {
                continue;
            }
            match self.drive_element(id, transition.to) {
                Ok(StateChangeSuccess::Success) => switched.push(id),
                Ok(StateChangeSuccess::Async) => {
                    switched.push(id);
                    waiting.push(id);
                }
                Err(err) if transition.is_upward() => {
                    switched.push(id);
                    self.rollback(&switched, transition.from);
                    return Err(err);
                }
                Err(err) => {
                    warn!(element = %element.name(), error = %err, "ignoring error while going down");
                }
            }
        }
        if waiting.is_empty() {
            Ok(StateChangeSuccess::Success)
        } else {
            self.async_waiting.extend(waiting);
            Ok(StateChangeSuccess::Async)
        }
    }

    fn rollback(&mut self, ids: &[ElementId], to: State) {
        for id in ids {
            let Some(element) = self.graph.get(*id).cloned() else {
                continue;
            };
            if element.current_state() > to || element.pending_state().is_some() {
                debug!(element = %element.name(), state = %to, "rolling back");
                if let Err(err) = self.drive_element(*id, to) {
                    warn!(element = %element.name(), error = %err, "rollback failed");
                }
            }
        }
        self.async_waiting.clear();
    }

    /// Drive one element to `to`, one transition at a time.
    pub(super) fn drive_element(&mut self, id: ElementId, to: State) -> Result<StateChangeSuccess> {
        let core = self.core(id)?;
        if core.pending_state().is_some() {
            if to > core.current_state() {
                return Ok(StateChangeSuccess::Async);
            }
            core.abort_async();
        }
        let mut state = core.current_state();
        while state != to {
            let next = state.next_toward(to);
            if core.change_state(StateChange::new(state, next))? == StateChangeSuccess::Async {
                return Ok(StateChangeSuccess::Async);
            }
            state = next;
        }
        Ok(StateChangeSuccess::Success)
    }

    fn commit_step(&mut self, transition: StateChange) {
        self.current = transition.to;
        self.pending = None;
        observability::record_state_change(&self.name, transition);
        observability::trace_state_change(&self.name, transition.from.name(), transition.to.name());
        let pending = (self.target != self.current).then_some(self.target);
        self.post(MessageBody::StateChanged {
            old: transition.from,
            new: transition.to,
            pending,
        });
    }

    /// Drop a pending step: elements that got ahead go back to the last
    /// completed state.
    fn cancel_async(&mut self) {
        debug!(pipeline = %self.name, pending = ?self.pending, "cancelling async state change");
        let current = self.current;
        for id in self.graph.sinks_first() {
            let ahead = self
                .graph
                .get(id)
                .is_some_and(|e| e.current_state() > current || e.pending_state().is_some());
            if ahead {
                if let Err(err) = self.drive_element(id, current) {
                    warn!(element = %self.element_name(id), error = %err, "cancel failed");
                }
            }
        }
        self.pending = None;
        self.async_waiting.clear();
    }

    /// Complete the pending step once no element is waiting any more.
    pub(super) fn finish_async_if_done(&mut self) {
        let Some(pending) = self.pending else {
            return;
        };
        if !self.async_waiting.is_empty() {
            return;
        }
        let transition = StateChange::new(self.current, pending);
        info!(pipeline = %self.name, %transition, "async state change complete");
        self.commit_step(transition);
        self.post(MessageBody::AsyncDone);
        if let Err(err) = self.continue_walk() {
            self.post(MessageBody::Error {
                error: err.to_string(),
                debug: Some("while continuing an asynchronous state change".into()),
            });
        }
    }

    /// An element finished prerolling outside a pipeline step, for example
    /// after joining a running pipeline. Bring it level with the pipeline.
    pub(super) fn catch_up(&mut self, id: ElementId) {
        let lagging = self
            .graph
            .get(id)
            .is_some_and(|e: &Element| e.pending_state().is_none() && e.current_state() < self.current);
        if lagging {
            let current = self.current;
            if let Err(err) = self.drive_element(id, current) {
                warn!(element = %self.element_name(id), error = %err, "could not catch up");
            }
        }
    }

    /// Post a message with the pipeline as source.
    pub(super) fn post(&self, body: MessageBody) {
        self.bus
            .post(Message::new(MessageSource::Pipeline(self.name.clone()), body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Caps;
    use crate::element::{ElementContext, ElementImpl, PadTemplate, PropertyKind, PropertySpec, PropertyValue};
    use std::sync::Mutex;

    struct Src;
    impl ElementImpl for Src {
        fn pad_templates(&self) -> Vec<PadTemplate> {
            vec![PadTemplate::src(Caps::new_any())]
        }
    }

    struct Sink {
        async_preroll: bool,
    }
    impl ElementImpl for Sink {
        fn pad_templates(&self) -> Vec<PadTemplate> {
            vec![PadTemplate::sink(Caps::new_any())]
        }

        fn change_state(&self, _ctx: &ElementContext, t: StateChange) -> Result<StateChangeSuccess> {
            if t == StateChange::READY_TO_PAUSED && self.async_preroll {
                Ok(StateChangeSuccess::Async)
            } else {
                Ok(StateChangeSuccess::Success)
            }
        }
    }

    /// Needs `location` before it can leave NULL.
    #[derive(Default)]
    struct NeedsLocation(Mutex<Option<String>>);
    impl ElementImpl for NeedsLocation {
        fn pad_templates(&self) -> Vec<PadTemplate> {
            vec![PadTemplate::src(Caps::new_any())]
        }

        fn properties(&self) -> Vec<PropertySpec> {
            vec![PropertySpec::required("location", PropertyKind::String, "Path")]
        }

        fn set_property(&self, _name: &str, value: &PropertyValue) -> Result<()> {
            *self.0.lock().unwrap() = Some(value.as_string());
            Ok(())
        }

        fn property(&self, _name: &str) -> Option<PropertyValue> {
            self.0.lock().unwrap().clone().map(PropertyValue::from)
        }
    }

    fn drain(pipeline: &Pipeline) -> Vec<Message> {
        std::iter::from_fn(|| pipeline.bus.pop()).collect()
    }

    fn pipeline_transitions(messages: &[Message]) -> Vec<(State, State)> {
        messages
            .iter()
            .filter(|m| m.is_from_pipeline())
            .filter_map(|m| match m.body() {
                MessageBody::StateChanged { old, new, .. } => Some((*old, *new)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_walks_through_intermediate_states() {
        let mut pipeline = Pipeline::new();
        let src = pipeline.add(Element::new("t", "src", Src)).unwrap();
        let sink = pipeline
            .add(Element::new("t", "sink", Sink { async_preroll: false }))
            .unwrap();
        pipeline.link(src, sink).unwrap();

        assert_eq!(pipeline.set_state(State::Playing).unwrap(), StateChangeSuccess::Success);
        assert_eq!(pipeline.current_state(), State::Playing);
        assert_eq!(pipeline.element(sink).unwrap().current_state(), State::Playing);
        assert_eq!(
            pipeline_transitions(&drain(&pipeline)),
            vec![
                (State::Null, State::Ready),
                (State::Ready, State::Paused),
                (State::Paused, State::Playing),
            ]
        );
    }

    #[test]
    fn test_same_state_posts_nothing() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add(Element::new("t", "sink", Sink { async_preroll: false }))
            .unwrap();
        pipeline.set_state(State::Paused).unwrap();
        drain(&pipeline);
        assert_eq!(pipeline.set_state(State::Paused).unwrap(), StateChangeSuccess::Success);
        assert!(drain(&pipeline).is_empty());
    }

    #[test]
    fn test_failure_keeps_last_good_state() {
        let mut pipeline = Pipeline::new();
        let sink = pipeline
            .add(Element::new("t", "sink", Sink { async_preroll: false }))
            .unwrap();
        pipeline
            .add(Element::new("t", "src", NeedsLocation::default()))
            .unwrap();

        let err = pipeline.set_state(State::Playing).unwrap_err();
        assert!(matches!(err, Error::StateChange { ref element, .. } if element == "src"));
        assert_eq!(pipeline.current_state(), State::Null);
        assert_eq!(pipeline.target_state(), State::Null);
        assert_eq!(pipeline.element(sink).unwrap().current_state(), State::Null);
    }

    #[test]
    fn test_async_sink_leaves_pipeline_pending() {
        let mut pipeline = Pipeline::new();
        let src = pipeline.add(Element::new("t", "src", Src)).unwrap();
        let sink = pipeline
            .add(Element::new("t", "sink", Sink { async_preroll: true }))
            .unwrap();
        pipeline.link(src, sink).unwrap();

        assert_eq!(pipeline.set_state(State::Playing).unwrap(), StateChangeSuccess::Async);
        assert_eq!(pipeline.current_state(), State::Ready);
        assert_eq!(pipeline.pending_state(), Some(State::Paused));
        assert_eq!(pipeline.set_state(State::Playing).unwrap(), StateChangeSuccess::Async);

        let err = pipeline.set_state(State::Paused).unwrap_err();
        assert!(matches!(err.as_misuse(), Some(MisuseError::AsyncInProgress { .. })));

        // Going down always works and cancels the pending change.
        assert_eq!(pipeline.set_state(State::Null).unwrap(), StateChangeSuccess::Success);
        assert_eq!(pipeline.current_state(), State::Null);
        assert!(pipeline.pending_state().is_none());
        assert!(pipeline.element(sink).unwrap().pending_state().is_none());
    }

    #[test]
    fn test_wait_state_times_out_without_preroll() {
        let mut pipeline = Pipeline::new();
        let src = pipeline.add(Element::new("t", "src", Src)).unwrap();
        let sink = pipeline
            .add(Element::new("t", "sink", Sink { async_preroll: true }))
            .unwrap();
        pipeline.link(src, sink).unwrap();
        pipeline.set_state(State::Paused).unwrap();
        let err = pipeline.wait_state(Some(Duration::from_millis(20))).unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }
}
