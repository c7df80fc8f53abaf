//! Negotiation error types.

use thiserror::Error;

/// Error during caps negotiation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// The two pads have no format in common.
    #[error("no common format between {upstream} and {downstream}:\n  {explanation}")]
    NoCommonFormat {
        /// Upstream pad, as `element.pad`.
        upstream: String,
        /// Downstream pad, as `element.pad`.
        downstream: String,
        /// Both sides' caps.
        explanation: String,
    },

    /// One pad already carries concrete caps the other side does not accept.
    #[error("{fixed_pad} is fixed to '{caps}', which {other_pad} does not accept ({accepted})")]
    FixedCapsRejected {
        /// The pad whose caps were already fixed.
        fixed_pad: String,
        /// Its caps.
        caps: String,
        /// The pad that rejected them.
        other_pad: String,
        /// What that pad accepts.
        accepted: String,
    },
}

impl NegotiationError {
    /// Create a "no common format" error listing both sides.
    pub fn no_common_format(
        upstream: impl Into<String>,
        downstream: impl Into<String>,
        upstream_caps: &str,
        downstream_caps: &str,
    ) -> Self {
        Self::NoCommonFormat {
            upstream: upstream.into(),
            downstream: downstream.into(),
            explanation: format!(
                "upstream offers: {upstream_caps}\n  downstream accepts: {downstream_caps}"
            ),
        }
    }
}
