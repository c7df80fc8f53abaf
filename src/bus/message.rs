//! Bus messages.

use crate::caps::Caps;
use crate::element::{Element, ElementWeak, PadId, State};
use bitflags::bitflags;
use std::fmt;
use std::time::Instant;

bitflags! {
    /// Message kinds, combinable into filter masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageType: u32 {
        /// Fatal error.
        const ERROR = 1 << 0;
        /// Non-fatal problem.
        const WARNING = 1 << 1;
        /// End of stream.
        const EOS = 1 << 2;
        /// A state transition completed.
        const STATE_CHANGED = 1 << 3;
        /// The stream duration is now different; cached values are stale.
        const DURATION_CHANGED = 1 << 4;
        /// An asynchronous state change or flushing seek completed.
        const ASYNC_DONE = 1 << 5;
        /// An element created a sometimes pad.
        const PAD_ADDED = 1 << 6;
        /// Application-defined.
        const APPLICATION = 1 << 7;
        /// Every kind.
        const ANY = u32::MAX;
    }
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Fatal error.
    Error {
        /// Human-readable description.
        error: String,
        /// Extra detail for developers.
        debug: Option<String>,
    },
    /// Non-fatal problem.
    Warning {
        /// Human-readable description.
        warning: String,
        /// Extra detail for developers.
        debug: Option<String>,
    },
    /// End of stream.
    Eos,
    /// A state transition completed.
    StateChanged {
        /// State before.
        old: State,
        /// State after.
        new: State,
        /// Final target, if more steps follow.
        pending: Option<State>,
    },
    /// The duration changed.
    DurationChanged,
    /// An asynchronous operation completed.
    AsyncDone,
    /// A sometimes pad appeared.
    PadAdded {
        /// Pad name.
        pad: String,
        /// Pad id within the element.
        pad_id: PadId,
        /// Announced format.
        caps: Caps,
    },
    /// Application-defined message.
    Application {
        /// Message name.
        name: String,
        /// Free-form payload.
        payload: String,
    },
}

impl MessageBody {
    /// The kind bit for this payload.
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Error { .. } => MessageType::ERROR,
            MessageBody::Warning { .. } => MessageType::WARNING,
            MessageBody::Eos => MessageType::EOS,
            MessageBody::StateChanged { .. } => MessageType::STATE_CHANGED,
            MessageBody::DurationChanged => MessageType::DURATION_CHANGED,
            MessageBody::AsyncDone => MessageType::ASYNC_DONE,
            MessageBody::PadAdded { .. } => MessageType::PAD_ADDED,
            MessageBody::Application { .. } => MessageType::APPLICATION,
        }
    }
}

/// Who posted a message.
#[derive(Debug, Clone)]
pub enum MessageSource {
    /// An element. The reference is weak: the element may be gone by the
    /// time the message is read.
    Element {
        /// Element name at posting time.
        name: String,
        /// The element.
        element: ElementWeak,
    },
    /// A pipeline, for aggregated messages.
    Pipeline(String),
    /// The application.
    Application(String),
}

impl MessageSource {
    /// Name of the poster.
    pub fn name(&self) -> &str {
        match self {
            MessageSource::Element { name, .. } => name,
            MessageSource::Pipeline(name) | MessageSource::Application(name) => name,
        }
    }

    /// The posting element, if it still exists.
    pub fn element(&self) -> Option<Element> {
        match self {
            MessageSource::Element { element, .. } => element.upgrade(),
            _ => None,
        }
    }
}

/// An immutable bus message.
#[derive(Debug, Clone)]
pub struct Message {
    seqnum: u64,
    timestamp: Instant,
    src: MessageSource,
    body: MessageBody,
}

impl Message {
    /// Create a message. The sequence number is assigned when posted.
    pub fn new(src: MessageSource, body: MessageBody) -> Self {
        Self {
            seqnum: 0,
            timestamp: Instant::now(),
            src,
            body,
        }
    }

    /// An application message.
    pub fn application(poster: impl Into<String>, name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(
            MessageSource::Application(poster.into()),
            MessageBody::Application {
                name: name.into(),
                payload: payload.into(),
            },
        )
    }

    pub(crate) fn set_seqnum(&mut self, seqnum: u64) {
        self.seqnum = seqnum;
    }

    /// Position in the bus's posting order.
    pub fn seqnum(&self) -> u64 {
        self.seqnum
    }

    /// When the message was created.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Poster.
    pub fn src(&self) -> &MessageSource {
        &self.src
    }

    /// Poster name.
    pub fn src_name(&self) -> &str {
        self.src.name()
    }

    /// Whether a pipeline posted this message.
    pub fn is_from_pipeline(&self) -> bool {
        matches!(self.src, MessageSource::Pipeline(_))
    }

    /// Payload.
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Kind.
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Whether the kind is in `mask`.
    pub fn matches(&self, mask: MessageType) -> bool {
        mask.intersects(self.message_type())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let src = self.src.name();
        match &self.body {
            MessageBody::Error { error, debug } => {
                write!(f, "ERROR from {src}: {error}")?;
                if let Some(debug) = debug {
                    write!(f, " ({debug})")?;
                }
                Ok(())
            }
            MessageBody::Warning { warning, .. } => write!(f, "WARNING from {src}: {warning}"),
            MessageBody::Eos => write!(f, "EOS from {src}"),
            MessageBody::StateChanged { old, new, pending } => {
                write!(f, "{src} changed state from {old} to {new}")?;
                if let Some(p) = pending {
                    write!(f, " (pending {p})")?;
                }
                Ok(())
            }
            MessageBody::DurationChanged => write!(f, "duration changed on {src}"),
            MessageBody::AsyncDone => write!(f, "async-done from {src}"),
            MessageBody::PadAdded { pad, caps, .. } => {
                write!(f, "{src} added pad {pad} with caps {caps}")
            }
            MessageBody::Application { name, payload } => {
                write!(f, "application message '{name}' from {src}: {payload}")
            }
        }
    }
}
