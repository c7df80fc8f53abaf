//! Queue element for asynchronous buffering.
//!
//! Provides a bounded buffer between pipeline elements, enabling:
//! - Decoupling of producer and consumer rates
//! - Backpressure handling
//! - Thread boundary crossing

use super::super::task::{StreamingTask, TaskControl};
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    ElementContext, ElementImpl, FlowError, FlowResult, PadTemplate, PropertyKind, PropertySpec,
    PropertyValue, State, StateChange, StateChangeSuccess,
};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::observability;
use kanal::{Receiver, Sender, bounded};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Default capacity in buffers.
const DEFAULT_MAX_SIZE_BUFFERS: usize = 200;

/// Leaky mode determines what happens when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeakyMode {
    /// Block until space is available (default).
    #[default]
    None,
    /// Drop new buffers when full (upstream leaky).
    Upstream,
    /// Drop old buffers when full (downstream leaky).
    Downstream,
}

impl LeakyMode {
    fn as_str(self) -> &'static str {
        match self {
            LeakyMode::None => "no",
            LeakyMode::Upstream => "upstream",
            LeakyMode::Downstream => "downstream",
        }
    }
}

impl std::str::FromStr for LeakyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no" | "none" => Ok(LeakyMode::None),
            "upstream" => Ok(LeakyMode::Upstream),
            "downstream" => Ok(LeakyMode::Downstream),
            other => Err(Error::TypeMismatch {
                property: "leaky".into(),
                expected: PropertyKind::String,
                found: format!("'{other}' (expected no, upstream or downstream)"),
            }),
        }
    }
}

enum Item {
    Buffer(Buffer),
    Eos,
}

struct Channel {
    tx: Sender<Item>,
    rx: Receiver<Item>,
}

/// A queue element that buffers data between pipeline stages.
///
/// Buffers arriving on the sink pad are stored and pushed downstream from
/// the queue's own streaming thread, so upstream and downstream run
/// concurrently. A flow error hit downstream is returned to upstream on
/// its next push.
///
/// # Properties
///
/// | Name | Type | Default |
/// |------|------|---------|
/// | `max-size-buffers` | int | 200 |
/// | `leaky` | string | `no` (`upstream`, `downstream`) |
/// | `current-level-buffers` | int | read-only |
pub struct Queue {
    max_size: Mutex<usize>,
    leaky: Mutex<LeakyMode>,
    channel: Mutex<Option<Channel>>,
    task: Mutex<Option<StreamingTask>>,
    /// Outcome of the last downstream push.
    last_flow: Arc<Mutex<FlowResult>>,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            max_size: Mutex::new(DEFAULT_MAX_SIZE_BUFFERS),
            leaky: Mutex::new(LeakyMode::None),
            channel: Mutex::new(None),
            task: Mutex::new(None),
            last_flow: Arc::new(Mutex::new(Ok(()))),
        }
    }
}

impl Queue {
    /// Create a queue with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.channel().as_ref().map_or(0, |c| c.rx.len())
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn channel(&self) -> MutexGuard<'_, Option<Channel>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_flow(&self) -> FlowResult {
        *self.last_flow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, ctx: &ElementContext) -> Result<()> {
        let capacity = (*self.max_size.lock().unwrap_or_else(PoisonError::into_inner)).max(1);
        let (tx, rx) = bounded(capacity);
        let worker_rx = rx.clone();
        *self.channel() = Some(Channel { tx, rx });
        *self.last_flow.lock().unwrap_or_else(PoisonError::into_inner) = Ok(());

        let last_flow = self.last_flow.clone();
        let ctx = ctx.clone();
        let task = StreamingTask::spawn(&format!("{}:src", ctx.name()), move |control| {
            drain(&worker_rx, &ctx, &control, &last_flow);
        })?;
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    fn stop(&self) {
        if let Some(channel) = self.channel().take() {
            let _ = channel.tx.close();
        }
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.stop();
        }
    }

    fn enqueue(&self, ctx: &ElementContext, item: Item) -> FlowResult {
        let (tx, rx) = match self.channel().as_ref() {
            Some(channel) => (channel.tx.clone(), channel.rx.clone()),
            None => return Err(FlowError::Flushing),
        };
        let leaky = *self.leaky.lock().unwrap_or_else(PoisonError::into_inner);

        if matches!(item, Item::Buffer(_)) {
            match leaky {
                LeakyMode::None => {}
                LeakyMode::Upstream => {
                    if tx.is_full() {
                        trace!(element = %ctx.name(), "queue full, dropping new buffer");
                        observability::record_buffer_dropped(ctx.name());
                        return Ok(());
                    }
                }
                LeakyMode::Downstream => {
                    while tx.is_full() {
                        match rx.try_recv() {
                            Ok(Some(_)) => {
                                trace!(element = %ctx.name(), "queue full, dropping oldest buffer");
                                observability::record_buffer_dropped(ctx.name());
                            }
                            Ok(None) => break,
                            Err(_) => return Err(FlowError::Flushing),
                        }
                    }
                }
            }
        }
        tx.send(item).map_err(|_| FlowError::Flushing)
    }
}

fn drain(
    rx: &Receiver<Item>,
    ctx: &ElementContext,
    control: &TaskControl,
    last_flow: &Mutex<FlowResult>,
) {
    while let Ok(item) = rx.recv() {
        if control.is_stopped() {
            return;
        }
        match item {
            Item::Buffer(buffer) => {
                let result = ctx.push("src", buffer);
                *last_flow.lock().unwrap_or_else(PoisonError::into_inner) = result;
                match result {
                    Ok(()) => {}
                    Err(FlowError::NotLinked) => {
                        ctx.post_error(
                            "internal data stream error",
                            Some(format!("streaming stopped, reason {}", FlowError::NotLinked)),
                        );
                        return;
                    }
                    Err(reason) => {
                        debug!(element = %ctx.name(), %reason, "pausing task");
                        return;
                    }
                }
            }
            Item::Eos => {
                ctx.push_event(Event::Eos);
                *last_flow.lock().unwrap_or_else(PoisonError::into_inner) = Err(FlowError::Eos);
                return;
            }
        }
    }
}

impl ElementImpl for Queue {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![
            PadTemplate::sink(Caps::new_any()),
            PadTemplate::src(Caps::new_any()),
        ]
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::new(
                "max-size-buffers",
                PropertyKind::Int,
                DEFAULT_MAX_SIZE_BUFFERS as i64,
                "Maximum number of queued buffers",
            ),
            PropertySpec::new("leaky", PropertyKind::String, "no", "Where to drop buffers when full"),
            PropertySpec::new("current-level-buffers", PropertyKind::Int, 0, "Buffers in the queue")
                .read_only(),
        ]
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        match name {
            "max-size-buffers" => {
                let size = value
                    .as_i64()
                    .and_then(|v| usize::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .ok_or_else(|| Error::TypeMismatch {
                        property: name.to_string(),
                        expected: PropertyKind::Int,
                        found: value.describe(),
                    })?;
                *self.max_size.lock().unwrap_or_else(PoisonError::into_inner) = size;
            }
            "leaky" => {
                *self.leaky.lock().unwrap_or_else(PoisonError::into_inner) = value.as_string().parse()?;
            }
            _ => {
                return Err(Error::UnknownProperty {
                    element: String::new(),
                    property: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "max-size-buffers" => Some(PropertyValue::Integer(
                *self.max_size.lock().unwrap_or_else(PoisonError::into_inner) as i64,
            )),
            "leaky" => Some(
                self.leaky
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_str()
                    .into(),
            ),
            "current-level-buffers" => Some(PropertyValue::Integer(self.len() as i64)),
            _ => None,
        }
    }

    fn change_state(&self, ctx: &ElementContext, transition: StateChange) -> Result<StateChangeSuccess> {
        match transition {
            StateChange::READY_TO_PAUSED => self.start(ctx)?,
            StateChange::PAUSED_TO_READY => self.stop(),
            _ => {}
        }
        Ok(StateChangeSuccess::Success)
    }

    fn chain(&self, ctx: &ElementContext, _pad: &str, buffer: Buffer) -> FlowResult {
        self.last_flow()?;
        self.enqueue(ctx, Item::Buffer(buffer))
    }

    fn sink_event(&self, ctx: &ElementContext, _pad: &str, event: Event) -> bool {
        match event {
            Event::FlushStart => {
                let handled = ctx.push_event(Event::FlushStart);
                self.stop();
                handled
            }
            Event::FlushStop => {
                let handled = ctx.push_event(Event::FlushStop);
                if ctx.state() >= State::Paused {
                    if let Err(err) = self.start(ctx) {
                        ctx.post_error("could not restart queue", Some(err.to_string()));
                        return false;
                    }
                }
                handled
            }
            Event::Eos => self.enqueue(ctx, Item::Eos).is_ok(),
            Event::Seek(_) => false,
        }
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    fn ctx() -> ElementContext {
        ElementContext::new(Weak::new(), "queue0".into())
    }

    /// Open the channel without a worker, so items stay queued.
    fn open(queue: &Queue) {
        let size = *queue.max_size.lock().unwrap();
        let (tx, rx) = bounded(size);
        *queue.channel() = Some(Channel { tx, rx });
    }

    #[test]
    fn test_leaky_parse() {
        assert_eq!("upstream".parse::<LeakyMode>().unwrap(), LeakyMode::Upstream);
        assert_eq!("no".parse::<LeakyMode>().unwrap(), LeakyMode::None);
        assert!("sideways".parse::<LeakyMode>().is_err());
    }

    #[test]
    fn test_leaky_upstream_drops_new() {
        let queue = Queue::new();
        queue.set_property("max-size-buffers", &PropertyValue::Integer(2)).unwrap();
        queue.set_property("leaky", &"upstream".into()).unwrap();
        open(&queue);
        let ctx = ctx();
        for i in 0..4u64 {
            queue.enqueue(&ctx, Item::Buffer(Buffer::zeroed(1).with_offset(i))).unwrap();
        }
        assert_eq!(queue.property("current-level-buffers"), Some(PropertyValue::Integer(2)));
        let channel = queue.channel.lock().unwrap();
        let rx = &channel.as_ref().unwrap().rx;
        let offsets: Vec<u64> = std::iter::from_fn(|| match rx.try_recv() {
            Ok(Some(Item::Buffer(b))) => Some(b.offset()),
            _ => None,
        })
        .collect();
        assert_eq!(offsets, vec![0, 1]);
    }

    #[test]
    fn test_leaky_downstream_drops_old() {
        let queue = Queue::new();
        queue.set_property("max-size-buffers", &PropertyValue::Integer(2)).unwrap();
        queue.set_property("leaky", &"downstream".into()).unwrap();
        open(&queue);
        let ctx = ctx();
        for i in 0..4u64 {
            queue.enqueue(&ctx, Item::Buffer(Buffer::zeroed(1).with_offset(i))).unwrap();
        }
        let channel = queue.channel.lock().unwrap();
        let rx = &channel.as_ref().unwrap().rx;
        let offsets: Vec<u64> = std::iter::from_fn(|| match rx.try_recv() {
            Ok(Some(Item::Buffer(b))) => Some(b.offset()),
            _ => None,
        })
        .collect();
        assert_eq!(offsets, vec![2, 3]);
    }

    #[test]
    fn test_closed_queue_is_flushing() {
        let queue = Queue::new();
        let ctx = ctx();
        assert_eq!(
            queue.enqueue(&ctx, Item::Buffer(Buffer::zeroed(1))),
            Err(FlowError::Flushing)
        );
        open(&queue);
        queue.stop();
        assert_eq!(queue.chain(&ctx, "sink", Buffer::zeroed(1)), Err(FlowError::Flushing));
    }

    #[test]
    fn test_invalid_size() {
        let queue = Queue::new();
        assert!(queue.set_property("max-size-buffers", &PropertyValue::Integer(0)).is_err());
    }
}
