//! Error types for mediagraph.
//!
//! Errors fall into a few classes that callers usually treat differently:
//! configuration problems (fatal to construction), negotiation failures
//! (fatal to one link attempt), state change failures (fatal to one
//! transition), recoverable timeouts, and [`MisuseError`]s, which flag a
//! programming mistake in the caller rather than a runtime condition.

use crate::element::{PropertyKind, State};
use crate::negotiation::NegotiationError;
use thiserror::Error;

/// Result type alias using mediagraph's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mediagraph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// [`crate::init`] has not been called (or [`crate::deinit`] already ran).
    #[error("mediagraph is not initialized")]
    NotInitialized,

    /// No factory is registered under this name.
    #[error("no element factory named '{0}'")]
    FactoryNotFound(String),

    /// The factory exists but could not build the element.
    #[error("failed to instantiate '{factory}': {reason}")]
    InstantiationFailed {
        /// Factory name.
        factory: String,
        /// Why construction failed.
        reason: String,
    },

    /// The element has no property with this name.
    #[error("element '{element}' has no property '{property}'")]
    UnknownProperty {
        /// Element name.
        element: String,
        /// Requested property.
        property: String,
    },

    /// The value cannot be converted to the property's type.
    #[error("property '{property}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Property name.
        property: String,
        /// Declared type of the property.
        expected: PropertyKind,
        /// Description of the offending value.
        found: String,
    },

    /// The property is read-only.
    #[error("property '{property}' of '{element}' is not writable")]
    PropertyNotWritable {
        /// Element name.
        element: String,
        /// Property name.
        property: String,
    },

    /// The value has the right type but is out of range.
    #[error("invalid value for property '{property}' of '{element}': {reason}")]
    InvalidValue {
        /// Element name.
        element: String,
        /// Property name.
        property: String,
        /// What is wrong with the value.
        reason: String,
    },

    /// An element with this name is already in the pipeline.
    #[error("an element named '{0}' already exists in the pipeline")]
    DuplicateName(String),

    /// No element with this name or id.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// The element has no pad with this name.
    #[error("element '{element}' has no pad '{pad}'")]
    PadNotFound {
        /// Element name.
        element: String,
        /// Pad name.
        pad: String,
    },

    /// The element has no pad template with this name.
    #[error("element '{element}' has no pad template '{template}'")]
    PadTemplateNotFound {
        /// Element name.
        element: String,
        /// Template name.
        template: String,
    },

    /// The link is structurally invalid (wrong directions, cycle, self-link).
    #[error("cannot link {src} to {sink}: {reason}")]
    InvalidLink {
        /// Upstream side, as `element.pad`.
        src: String,
        /// Downstream side, as `element.pad`.
        sink: String,
        /// What is wrong with the link.
        reason: String,
    },

    /// Capability negotiation failed.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// An element refused a state transition.
    #[error("state change of '{element}' failed: {reason}")]
    StateChange {
        /// Element (or pipeline) that failed.
        element: String,
        /// Reason reported by the element.
        reason: String,
    },

    /// The call violates the API contract.
    #[error(transparent)]
    Misuse(#[from] MisuseError),

    /// A bounded wait expired.
    #[error("operation timed out")]
    Timeout,

    /// A query or seek was issued outside PAUSED/PLAYING.
    #[error("pipeline is not ready (state {0})")]
    NotReady(State),

    /// No element in the pipeline could handle the seek.
    #[error("pipeline is not seekable")]
    NotSeekable,

    /// A caps string or launch line could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The resource locator is malformed.
    #[error("invalid URI '{0}'")]
    InvalidUri(String),

    /// No source factory handles this URI scheme.
    #[error("no element handles URI scheme '{0}'")]
    NoUriHandler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors caused by calling the API incorrectly.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Error::Misuse(_))
    }

    /// True for construction-time configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::NotInitialized
                | Error::FactoryNotFound(_)
                | Error::InstantiationFailed { .. }
                | Error::UnknownProperty { .. }
                | Error::TypeMismatch { .. }
                | Error::PropertyNotWritable { .. }
                | Error::InvalidValue { .. }
                | Error::DuplicateName(_)
                | Error::ElementNotFound(_)
                | Error::PadNotFound { .. }
                | Error::PadTemplateNotFound { .. }
                | Error::InvalidLink { .. }
                | Error::Parse(_)
                | Error::InvalidUri(_)
                | Error::NoUriHandler(_)
        )
    }

    /// True if retrying later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Timeout | Error::NotReady(_))
    }

    /// Returns the misuse detail, if this is a misuse error.
    pub fn as_misuse(&self) -> Option<&MisuseError> {
        match self {
            Error::Misuse(m) => Some(m),
            _ => None,
        }
    }
}

/// API contract violations.
///
/// These never happen in a correct program; they are reported instead of
/// panicking so that long-running hosts can log and continue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MisuseError {
    /// The request pad was already released.
    #[error("pad '{element}.{pad}' was already released")]
    PadAlreadyReleased {
        /// Element name.
        element: String,
        /// Pad name.
        pad: String,
    },

    /// Only request pads can be released.
    #[error("pad '{element}.{pad}' is not a request pad")]
    NotRequestPad {
        /// Element name.
        element: String,
        /// Pad name.
        pad: String,
    },

    /// Pads can only be requested from request templates.
    #[error("template '{template}' of '{element}' is not a request template")]
    NotRequestTemplate {
        /// Element name.
        element: String,
        /// Template name.
        template: String,
    },

    /// A pad holds at most one link.
    #[error("pad '{element}.{pad}' is already linked")]
    PadAlreadyLinked {
        /// Element name.
        element: String,
        /// Pad name.
        pad: String,
    },

    /// Unlinking a pad that has no peer.
    #[error("pad '{element}.{pad}' is not linked")]
    PadNotLinked {
        /// Element name.
        element: String,
        /// Pad name.
        pad: String,
    },

    /// The element is being removed or disposed and no longer hands out pads.
    #[error("element '{0}' is being torn down")]
    ElementSealed(String),

    /// Request pads must be released before the element is removed.
    #[error("element '{element}' still has {count} request pad(s)")]
    RequestPadsOutstanding {
        /// Element name.
        element: String,
        /// Number of unreleased request pads.
        count: usize,
    },

    /// A seek was issued before the previous one completed.
    #[error("a seek is already in progress")]
    SeekInProgress,

    /// A different upward target was requested while an async change is pending.
    #[error("async transition to {pending} in progress, cannot go to {requested}")]
    AsyncInProgress {
        /// State currently being reached asynchronously.
        pending: State,
        /// The conflicting request.
        requested: State,
    },

    /// The discoverer must be started before queuing URIs.
    #[error("discoverer is not started")]
    NotStarted,

    /// A bus has at most one watch.
    #[error("bus already has a watch installed")]
    WatchAlreadyInstalled,

    /// The element already belongs to a pipeline.
    #[error("element '{0}' already has a parent")]
    AlreadyInPipeline(String),

    /// The call needs a tokio runtime and none is running.
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,
}
