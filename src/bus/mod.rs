//! The message bus.
//!
//! A [`Bus`] is a FIFO of [`Message`]s shared between any number of posting
//! threads and the reading application. Messages can be read three ways:
//!
//! - blocking, with [`Bus::timed_pop_filtered`] (`None` waits forever, a
//!   zero timeout polls),
//! - as an async [`futures::Stream`] with [`Bus::stream`],
//! - push-style on a tokio runtime with [`Bus::add_watch`].
//!
//! Filtering never reorders: messages that do not match the mask stay
//! queued in their original position.

mod message;

pub use message::{Message, MessageBody, MessageSource, MessageType};

use crate::error::{MisuseError, Result};
use crate::observability;
use futures::Stream;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Default)]
struct BusState {
    queue: VecDeque<Message>,
    flushing: bool,
    next_seqnum: u64,
}

struct BusInner {
    state: Mutex<BusState>,
    cond: Condvar,
    notify: Notify,
    watched: AtomicBool,
}

/// Thread-safe message queue.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                cond: Condvar::new(),
                notify: Notify::new(),
                watched: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a message. Never blocks. Returns `false` if the bus is flushing
    /// and the message was dropped.
    pub fn post(&self, message: Message) -> bool {
        self.enqueue(message).is_some()
    }

    /// Queue a message and return the sequence number it was given.
    pub(crate) fn enqueue(&self, mut message: Message) -> Option<u64> {
        let seqnum = {
            let mut state = self.lock();
            if state.flushing {
                trace!(message = %message, "bus flushing, dropping message");
                return None;
            }
            state.next_seqnum += 1;
            message.set_seqnum(state.next_seqnum);
            observability::record_message_posted(message.message_type());
            trace!(message = %message, "posted");
            state.queue.push_back(message);
            state.next_seqnum
        };
        self.inner.cond.notify_all();
        self.inner.notify.notify_waiters();
        Some(seqnum)
    }

    /// Wait up to `timeout` for a message whose kind is in `mask`.
    ///
    /// `None` waits indefinitely; `Some(Duration::ZERO)` only checks what
    /// is already queued. Non-matching messages are left in place.
    pub fn timed_pop_filtered(&self, timeout: Option<Duration>, mask: MessageType) -> Option<Message> {
        self.pop_where(timeout, |m| m.matches(mask))
    }

    /// Wait up to `timeout` for any message.
    pub fn timed_pop(&self, timeout: Option<Duration>) -> Option<Message> {
        self.timed_pop_filtered(timeout, MessageType::ANY)
    }

    /// Take the first queued message without waiting.
    pub fn pop(&self) -> Option<Message> {
        self.timed_pop(Some(Duration::ZERO))
    }

    /// Take the first queued message matching `mask` without waiting.
    pub fn pop_filtered(&self, mask: MessageType) -> Option<Message> {
        self.timed_pop_filtered(Some(Duration::ZERO), mask)
    }

    /// Copy of the first queued message.
    pub fn peek(&self) -> Option<Message> {
        self.lock().queue.front().cloned()
    }

    /// Whether any message is queued.
    pub fn have_pending(&self) -> bool {
        !self.lock().queue.is_empty()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// While flushing, queued messages are dropped, posts are rejected and
    /// waiters return immediately.
    pub fn set_flushing(&self, flushing: bool) {
        {
            let mut state = self.lock();
            state.flushing = flushing;
            if flushing {
                state.queue.clear();
            }
        }
        self.inner.cond.notify_all();
        self.inner.notify.notify_waiters();
    }

    pub(crate) fn pop_where(
        &self,
        timeout: Option<Duration>,
        mut pred: impl FnMut(&Message) -> bool,
    ) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if let Some(pos) = state.queue.iter().position(&mut pred) {
                return state.queue.remove(pos);
            }
            if state.flushing {
                return None;
            }
            state = match deadline {
                None => self
                    .inner
                    .cond
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.inner
                        .cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Wait asynchronously for a message matching `mask`. Returns `None`
    /// once the bus is flushing.
    pub async fn next_filtered(&self, mask: MessageType) -> Option<Message> {
        loop {
            let notified = self.inner.notify.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(pos) = state.queue.iter().position(|m| m.matches(mask)) {
                    return state.queue.remove(pos);
                }
                if state.flushing {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Messages matching `mask` as an async stream. Ends when the bus
    /// starts flushing.
    pub fn stream(&self, mask: MessageType) -> impl Stream<Item = Message> + Send + 'static {
        futures::stream::unfold(self.clone(), move |bus| async move {
            let message = bus.next_filtered(mask).await?;
            Some((message, bus))
        })
    }

    /// Deliver every message to `callback` on the current tokio runtime.
    ///
    /// The watch stops when the callback returns [`ControlFlow::Break`],
    /// when the bus starts flushing, or when the returned handle is
    /// removed. A bus has at most one watch.
    pub fn add_watch<F>(&self, mut callback: F) -> Result<BusWatch>
    where
        F: FnMut(&Message) -> ControlFlow<()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MisuseError::NoRuntime)?;
        if self.inner.watched.swap(true, Ordering::SeqCst) {
            return Err(MisuseError::WatchAlreadyInstalled.into());
        }
        let bus = self.clone();
        let task = runtime.spawn(async move {
            while let Some(message) = bus.next_filtered(MessageType::ANY).await {
                if callback(&message).is_break() {
                    break;
                }
            }
            bus.inner.watched.store(false, Ordering::SeqCst);
        });
        Ok(BusWatch {
            task,
            bus: self.clone(),
        })
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Bus")
            .field("queued", &state.queue.len())
            .field("flushing", &state.flushing)
            .finish()
    }
}

/// Handle to a watch installed with [`Bus::add_watch`].
pub struct BusWatch {
    task: JoinHandle<()>,
    bus: Bus,
}

impl std::fmt::Debug for BusWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusWatch").finish_non_exhaustive()
    }
}

impl BusWatch {
    /// Stop delivering messages.
    pub fn remove(self) {
        self.task.abort();
        self.bus.inner.watched.store(false, Ordering::SeqCst);
    }

    /// Whether the watch has stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the watch stops on its own.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::thread;

    fn app(name: &str) -> Message {
        Message::application("test", name, "")
    }

    fn eos() -> Message {
        Message::new(MessageSource::Pipeline("p".into()), MessageBody::Eos)
    }

    #[test]
    fn test_zero_timeout_on_empty_returns_immediately() {
        let bus = Bus::new();
        let start = Instant::now();
        assert!(bus.timed_pop_filtered(Some(Duration::ZERO), MessageType::ANY).is_none());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_fifo_and_seqnums() {
        let bus = Bus::new();
        bus.post(app("a"));
        bus.post(app("b"));
        let a = bus.pop().unwrap();
        let b = bus.pop().unwrap();
        assert!(a.seqnum() < b.seqnum());
        assert!(matches!(a.body(), MessageBody::Application { name, .. } if name == "a"));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_filter_leaves_others_in_place() {
        let bus = Bus::new();
        bus.post(app("first"));
        bus.post(eos());
        bus.post(app("second"));

        let msg = bus.pop_filtered(MessageType::EOS).unwrap();
        assert_eq!(msg.message_type(), MessageType::EOS);
        assert_eq!(bus.len(), 2);
        assert!(matches!(bus.pop().unwrap().body(), MessageBody::Application { name, .. } if name == "first"));
        assert!(matches!(bus.pop().unwrap().body(), MessageBody::Application { name, .. } if name == "second"));
    }

    #[test]
    fn test_timeout_expires() {
        let bus = Bus::new();
        bus.post(app("ignored"));
        let start = Instant::now();
        let msg = bus.timed_pop_filtered(Some(Duration::from_millis(30)), MessageType::ERROR);
        assert!(msg.is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_blocking_pop_wakes_on_post() {
        let bus = Bus::new();
        let poster = bus.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post(eos());
        });
        let msg = bus.timed_pop_filtered(None, MessageType::EOS);
        assert!(msg.is_some());
        handle.join().unwrap();
    }

    #[test]
    fn test_concurrent_posters_deliver_exactly_once() {
        let bus = Bus::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let bus = bus.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        bus.post(app(&format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut seen = std::collections::HashSet::new();
        while let Some(m) = bus.pop() {
            assert!(seen.insert(m.seqnum()));
        }
        assert_eq!(seen.len(), 200);
    }

    #[test]
    fn test_flushing_drops_and_rejects() {
        let bus = Bus::new();
        bus.post(eos());
        bus.set_flushing(true);
        assert!(bus.is_empty());
        assert!(!bus.post(eos()));
        assert!(bus.timed_pop(None).is_none());
        bus.set_flushing(false);
        assert!(bus.post(eos()));
    }

    #[tokio::test]
    async fn test_stream() {
        let bus = Bus::new();
        bus.post(app("skip"));
        bus.post(eos());
        let mut stream = Box::pin(bus.stream(MessageType::EOS));
        let msg = stream.next().await.unwrap();
        assert_eq!(msg.message_type(), MessageType::EOS);
        assert_eq!(bus.len(), 1);
    }

    #[tokio::test]
    async fn test_watch_delivers_until_break() {
        let bus = Bus::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut tx = Some(tx);
        let mut count = 0;
        let watch = bus
            .add_watch(move |msg| {
                count += 1;
                if msg.message_type() == MessageType::EOS {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(count);
                    }
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            })
            .unwrap();
        assert!(bus.add_watch(|_| ControlFlow::Continue(())).is_err());

        bus.post(app("one"));
        bus.post(app("two"));
        bus.post(eos());
        assert_eq!(rx.await.unwrap(), 3);
        watch.join().await;
        // The watch slot is free again.
        let again = bus.add_watch(|_| ControlFlow::Continue(())).unwrap();
        again.remove();
    }

    #[test]
    fn test_watch_requires_runtime() {
        let bus = Bus::new();
        let err = bus.add_watch(|_| ControlFlow::Continue(())).err().unwrap();
        assert_eq!(err.as_misuse(), Some(&MisuseError::NoRuntime));
    }
}
