//! Draining the pipeline bus.
//!
//! Element messages that drive the pipeline itself (async-done, pad-added,
//! end-of-stream, errors, duration changes) are handled on the control
//! thread while the application drains the bus. The application sees the
//! pipeline's own summaries instead of the raw element messages, plus any
//! element message it asked for by type.

use super::dynamic::PadAddedInfo;
use super::{ElementId, Pipeline};
use crate::bus::{Message, MessageBody, MessageSource, MessageType};
use crate::element::State;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// Element messages the pipeline reacts to.
const HANDLED: MessageType = MessageType::EOS
    .union(MessageType::ASYNC_DONE)
    .union(MessageType::PAD_ADDED)
    .union(MessageType::ERROR)
    .union(MessageType::DURATION_CHANGED);

impl Pipeline {
    /// Pop the first message matching `mask`, waiting up to `timeout`
    /// (`None` waits forever, zero polls).
    ///
    /// Element messages the pipeline handles are processed on the way, even
    /// if they do not match `mask`.
    pub fn timed_pop_filtered(&mut self, timeout: Option<Duration>, mask: MessageType) -> Option<Message> {
        if let Some(pos) = self.processed.iter().position(|m| m.matches(mask)) {
            return self.processed.remove(pos);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let msg = self
                .bus
                .pop_where(remaining, |m| m.matches(mask) || (!m.is_from_pipeline() && m.matches(HANDLED)))?;
            if let Some(msg) = self.dispatch(msg, mask) {
                return Some(msg);
            }
        }
    }

    /// Pop any message, waiting up to `timeout`.
    pub fn timed_pop(&mut self, timeout: Option<Duration>) -> Option<Message> {
        self.timed_pop_filtered(timeout, MessageType::ANY)
    }

    /// Process queued messages without waiting and return the first one
    /// matching `mask`.
    pub fn poll(&mut self, mask: MessageType) -> Option<Message> {
        self.timed_pop_filtered(Some(Duration::ZERO), mask)
    }

    /// Wait one poll slice for a message matching `mask`.
    pub fn poll_interval(&mut self, mask: MessageType) -> Option<Message> {
        let slice = self.config.poll_interval;
        self.timed_pop_filtered(Some(slice), mask)
    }

    /// Let the pipeline react to a message read directly from its bus (for
    /// example through a watch). Returns the message unless the pipeline
    /// consumed it.
    pub fn handle_message(&mut self, msg: Message) -> Option<Message> {
        self.dispatch(msg, MessageType::ANY)
    }

    fn dispatch(&mut self, msg: Message, mask: MessageType) -> Option<Message> {
        if msg.is_from_pipeline() {
            if self.seek_done.is_some_and(|seqnum| seqnum == msg.seqnum()) {
                debug!(pipeline = %self.name, "seek completion observed");
                self.seek_pending = false;
                self.seek_done = None;
            }
            return msg.matches(mask).then_some(msg);
        }
        trace!(pipeline = %self.name, %msg, "handling");
        let id = msg.src().element().and_then(|e| self.id_of(&e));
        match msg.body() {
            MessageBody::AsyncDone => {
                if let Some(id) = id {
                    self.on_async_done(id);
                }
                None
            }
            MessageBody::Eos => {
                if let Some(id) = id {
                    self.on_eos(id);
                }
                None
            }
            MessageBody::PadAdded { pad, caps, .. } => {
                if let Some(id) = id {
                    let info = PadAddedInfo {
                        element: id,
                        element_name: msg.src_name().to_string(),
                        pad: pad.clone(),
                        caps: caps.clone(),
                    };
                    self.run_pad_added_handlers(&info);
                }
                msg.matches(mask).then_some(msg)
            }
            MessageBody::Error { error: text, debug: detail } => {
                error!(
                    pipeline = %self.name,
                    element = %msg.src_name(),
                    error = %text,
                    debug = detail.as_deref().unwrap_or(""),
                    "element error"
                );
                if self.config.teardown_on_error && self.current != State::Null {
                    if let Err(err) = self.set_state(State::Null) {
                        error!(pipeline = %self.name, error = %err, "teardown failed");
                    }
                }
                if msg.matches(mask) {
                    Some(msg)
                } else {
                    self.processed.push_back(msg);
                    None
                }
            }
            MessageBody::DurationChanged => {
                debug!(pipeline = %self.name, element = %msg.src_name(), "duration changed");
                self.duration_cache = None;
                msg.matches(mask).then_some(msg)
            }
            _ => msg.matches(mask).then_some(msg),
        }
    }

    fn on_async_done(&mut self, id: ElementId) {
        if self.async_waiting.remove(&id) {
            debug!(
                pipeline = %self.name,
                element = %self.element_name(id),
                remaining = self.async_waiting.len(),
                "element prerolled"
            );
            self.finish_async_if_done();
        } else if self.seek_pending && self.seek_done.is_none() {
            self.complete_seek();
        } else {
            self.catch_up(id);
        }
    }

    fn on_eos(&mut self, id: ElementId) {
        if self.eos_posted || !self.graph.get(id).is_some_and(|e| e.is_sink()) {
            return;
        }
        self.eos_sinks.insert(id);
        self.post_eos_if_complete();
    }

    /// Post the aggregated end-of-stream once every sink has reached it.
    pub(super) fn post_eos_if_complete(&mut self) {
        if self.eos_posted || self.eos_sinks.is_empty() {
            return;
        }
        let sinks = self.graph.sinks();
        if sinks.iter().all(|s| self.eos_sinks.contains(s)) {
            info!(pipeline = %self.name, sinks = sinks.len(), "all sinks reached end of stream");
            self.eos_posted = true;
            self.post(MessageBody::Eos);
        }
    }

    /// Post the async-done that completes the pending seek. The seek stays
    /// pending until that message is drained.
    pub(super) fn complete_seek(&mut self) {
        debug!(pipeline = %self.name, "seek complete");
        let message = Message::new(MessageSource::Pipeline(self.name.clone()), MessageBody::AsyncDone);
        self.seek_done = self.bus.enqueue(message);
        if self.seek_done.is_none() {
            self.seek_pending = false;
        }
    }

    /// Forget end-of-stream bookkeeping after a flush or restart.
    pub(super) fn reset_eos(&mut self) {
        self.eos_sinks.clear();
        self.eos_posted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::caps::Caps;
    use crate::element::{Element, ElementContext, ElementImpl, PadTemplate, StateChange, StateChangeSuccess};
    use crate::error::Result;
    use crate::pipeline::PipelineConfig;

    struct Src;
    impl ElementImpl for Src {
        fn pad_templates(&self) -> Vec<PadTemplate> {
            vec![PadTemplate::src(Caps::new_any())]
        }
    }

    struct AsyncSink;
    impl ElementImpl for AsyncSink {
        fn pad_templates(&self) -> Vec<PadTemplate> {
            vec![PadTemplate::sink(Caps::new_any())]
        }

        fn change_state(&self, _ctx: &ElementContext, t: StateChange) -> Result<StateChangeSuccess> {
            Ok(if t == StateChange::READY_TO_PAUSED {
                StateChangeSuccess::Async
            } else {
                StateChangeSuccess::Success
            })
        }
    }

    fn src_sink(pipeline: &mut Pipeline) -> (Element, ElementId) {
        let src = Element::new("t", "src", Src);
        let src_id = pipeline.add(src.clone()).unwrap();
        let sink = pipeline.add(Element::new("t", "sink", AsyncSink)).unwrap();
        pipeline.link(src_id, sink).unwrap();
        (src, sink)
    }

    #[test]
    fn test_async_done_continues_to_target() {
        let mut pipeline = Pipeline::new();
        let (src, sink) = src_sink(&mut pipeline);
        assert_eq!(pipeline.set_state(State::Playing).unwrap(), StateChangeSuccess::Async);

        src.core().push("src", Buffer::zeroed(8)).unwrap();
        let done = pipeline.timed_pop_filtered(Some(Duration::from_secs(1)), MessageType::ASYNC_DONE);
        assert!(done.is_some_and(|m| m.is_from_pipeline()));
        assert_eq!(pipeline.current_state(), State::Playing);
        assert!(pipeline.pending_state().is_none());
        assert_eq!(pipeline.element(sink).unwrap().current_state(), State::Playing);
    }

    #[test]
    fn test_eos_aggregated_over_sinks() {
        let mut pipeline = Pipeline::new();
        let (src, _) = src_sink(&mut pipeline);
        pipeline.set_state(State::Playing).unwrap();
        src.core().push("src", Buffer::zeroed(8)).unwrap();
        pipeline.wait_state(Some(Duration::from_secs(1))).unwrap();

        assert!(src.core().push_event("src", crate::event::Event::Eos));
        let eos = pipeline
            .timed_pop_filtered(Some(Duration::from_secs(1)), MessageType::EOS)
            .unwrap();
        assert!(eos.is_from_pipeline());
        assert!(pipeline.poll(MessageType::EOS).is_none());
    }

    #[test]
    fn test_error_tears_down() {
        let mut pipeline = Pipeline::new();
        let (src, _) = src_sink(&mut pipeline);
        pipeline.set_state(State::Ready).unwrap();
        src.core().context().post_error("boom", None);

        // Not asked for, but the teardown still happens and the error is
        // kept for a later read.
        assert!(pipeline.poll(MessageType::EOS).is_none());
        assert_eq!(pipeline.current_state(), State::Null);
        let err = pipeline.poll(MessageType::ERROR).unwrap();
        assert!(matches!(err.body(), MessageBody::Error { error, .. } if error == "boom"));
    }

    #[test]
    fn test_error_without_teardown() {
        let mut pipeline = Pipeline::with_config(PipelineConfig::default().with_teardown_on_error(false));
        let (src, _) = src_sink(&mut pipeline);
        pipeline.set_state(State::Ready).unwrap();
        src.core().context().post_error("boom", None);
        assert!(pipeline.poll(MessageType::ERROR).is_some());
        assert_eq!(pipeline.current_state(), State::Ready);
    }
}
