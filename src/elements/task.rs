//! Streaming threads owned by elements.

use crate::error::Result;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Default)]
struct TaskShared {
    stopped: Mutex<bool>,
    cond: Condvar,
}

/// Handle given to the streaming thread to check for shutdown.
#[derive(Clone)]
pub(crate) struct TaskControl {
    shared: Arc<TaskShared>,
}

impl TaskControl {
    pub(crate) fn is_stopped(&self) -> bool {
        *self
            .shared
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration`, waking early on stop. Returns `true` if the
    /// task was stopped.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut stopped = self
            .shared
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = self
                .shared
                .cond
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// A streaming thread. Stopping it joins the thread.
pub(crate) struct StreamingTask {
    control: TaskControl,
    handle: Option<JoinHandle<()>>,
}

impl StreamingTask {
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(TaskControl) + Send + 'static,
    {
        let control = TaskControl {
            shared: Arc::new(TaskShared::default()),
        };
        let thread_control = control.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(thread_control))?;
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Ask the thread to stop without waiting for it.
    pub(crate) fn signal(&self) {
        *self
            .control
            .shared
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.control.shared.cond.notify_all();
    }

    /// Stop and join the thread.
    pub(crate) fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.signal();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            // Stopped from its own thread (an error path); it exits on return.
            return;
        }
        if handle.join().is_err() {
            warn!("streaming thread panicked");
        }
    }
}

impl Drop for StreamingTask {
    fn drop(&mut self) {
        self.join();
    }
}
