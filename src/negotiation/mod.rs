//! Link-time caps negotiation.
//!
//! When two pads are linked, [`negotiate`] picks the single format both
//! sides will use:
//!
//! 1. If a pad already carries concrete caps (for example a demuxer pad
//!    announced with its stream format), the other pad must accept a format
//!    inside them, and the result is drawn from those caps.
//! 2. Otherwise the accepted caps of both pads are intersected, the first
//!    alternative wins, and it is fixated (ranges to their minimum, lists to
//!    their first entry, unconstrained attributes dropped).
//!
//! The result is the same whichever pad is passed first. Negotiation is a
//! pure function; the caller stores the result on both pads only on success.

mod error;

pub use error::NegotiationError;

use crate::caps::Caps;
use tracing::trace;

/// One side of a link, as seen by the negotiator.
#[derive(Debug, Clone, Copy)]
pub struct PadCaps<'a> {
    /// Pad label for error messages, usually `element.pad`.
    pub label: &'a str,
    /// Everything the pad can handle.
    pub accepted: &'a Caps,
    /// Concrete caps the pad is already committed to, if any.
    pub fixed: Option<&'a Caps>,
}

impl<'a> PadCaps<'a> {
    /// A pad that is not yet committed to a format.
    pub fn new(label: &'a str, accepted: &'a Caps) -> Self {
        Self {
            label,
            accepted,
            fixed: None,
        }
    }

    /// A pad already committed to `fixed`.
    pub fn with_fixed(mut self, fixed: Option<&'a Caps>) -> Self {
        self.fixed = fixed;
        self
    }
}

/// Resolve the format two pads agree on.
pub fn negotiate(a: &PadCaps<'_>, b: &PadCaps<'_>) -> Result<Caps, NegotiationError> {
    let result = match (a.fixed, b.fixed) {
        (Some(fa), Some(fb)) => {
            let common = fa.intersect(fb);
            if common.is_empty() {
                return Err(NegotiationError::no_common_format(
                    a.label,
                    b.label,
                    &fa.to_string(),
                    &fb.to_string(),
                ));
            }
            common.fixate()
        }
        (Some(fixed), None) => within_fixed(a, fixed, b)?,
        (None, Some(fixed)) => within_fixed(b, fixed, a)?,
        (None, None) => {
            let common = a.accepted.intersect(b.accepted);
            if common.is_empty() {
                return Err(NegotiationError::no_common_format(
                    a.label,
                    b.label,
                    &a.accepted.to_string(),
                    &b.accepted.to_string(),
                ));
            }
            common.fixate()
        }
    };
    trace!(a = a.label, b = b.label, caps = %result, "negotiated");
    Ok(result)
}

fn within_fixed(
    fixed_side: &PadCaps<'_>,
    fixed: &Caps,
    other: &PadCaps<'_>,
) -> Result<Caps, NegotiationError> {
    let common = fixed.intersect(other.accepted);
    if common.is_empty() {
        return Err(NegotiationError::FixedCapsRejected {
            fixed_pad: fixed_side.label.to_string(),
            caps: fixed.to_string(),
            other_pad: other.label.to_string(),
            accepted: other.accepted.to_string(),
        });
    }
    Ok(common.fixate())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(s: &str) -> Caps {
        s.parse().unwrap()
    }

    #[test]
    fn test_negotiate_fixates_first_alternative() {
        let src = caps("video/x-raw, format={ I420, RGB }, width=[ 320, 1920 ]");
        let sink = caps("video/x-raw, format={ RGB, I420 }, width=[ 640, 3840 ]");
        let result = negotiate(&PadCaps::new("src.src", &src), &PadCaps::new("sink.sink", &sink))
            .unwrap();
        assert!(result.is_fixed());
        assert_eq!(result.first().unwrap().get_int("width"), Some(640));
    }

    #[test]
    fn test_negotiate_is_commutative() {
        let samples = [
            "ANY",
            "video/x-raw",
            "video/x-raw, width=640, height=480",
            "video/x-raw, format={ I420, RGB }",
            "video/x-raw, format={ RGB, I420 }; audio/x-raw",
            "audio/x-raw, rate=[ 8000, 48000 ], channels={ 2, 1 }",
            "audio/x-raw, rate=44100, channels=1",
            "audio/x-raw; video/x-raw, width=[ 1, 800 ]",
            "EMPTY",
        ];
        for x in samples {
            for y in samples {
                let (cx, cy) = (caps(x), caps(y));
                let a = PadCaps::new("a", &cx);
                let b = PadCaps::new("b", &cy);
                let ab = negotiate(&a, &b);
                let ba = negotiate(&b, &a);
                assert_eq!(ab.is_ok(), ba.is_ok(), "{x} vs {y}");
                if let (Ok(ab), Ok(ba)) = (ab, ba) {
                    assert_eq!(ab, ba, "{x} vs {y}");
                }
                // Fails exactly when no alternative pair intersects.
                assert_eq!(
                    negotiate(&a, &b).is_ok(),
                    cx.can_intersect(&cy),
                    "{x} vs {y}"
                );
            }
        }
    }

    #[test]
    fn test_failure_leaves_inputs_untouched() {
        let src = caps("audio/x-raw");
        let sink = caps("video/x-raw");
        let err = negotiate(&PadCaps::new("d.src_0", &src), &PadCaps::new("s.sink", &sink))
            .unwrap_err();
        assert!(matches!(err, NegotiationError::NoCommonFormat { .. }));
        assert!(err.to_string().contains("d.src_0"));
        assert_eq!(src, caps("audio/x-raw"));
    }

    #[test]
    fn test_fixed_side_must_be_accepted() {
        let any = Caps::new_any();
        let announced = caps("audio/x-raw, rate=44100");
        let video_sink = caps("video/x-raw");
        let err = negotiate(
            &PadCaps::new("demux.src_0", &any).with_fixed(Some(&announced)),
            &PadCaps::new("sink.sink", &video_sink),
        )
        .unwrap_err();
        assert!(matches!(err, NegotiationError::FixedCapsRejected { .. }));

        let audio_sink = caps("audio/x-raw, rate=[ 8000, 96000 ], channels={ 2, 1 }");
        let ok = negotiate(
            &PadCaps::new("sink.sink", &audio_sink),
            &PadCaps::new("demux.src_0", &any).with_fixed(Some(&announced)),
        )
        .unwrap();
        assert_eq!(ok, caps("audio/x-raw, rate=44100, channels=2"));
    }

    #[test]
    fn test_fixed_caps_win_over_preference() {
        // The sink prefers 48000 but the fixed side dictates 44100.
        let fixed = caps("audio/x-raw, rate=44100");
        let sink = caps("audio/x-raw, rate={ 48000, 44100 }");
        let any = Caps::new_any();
        let result = negotiate(
            &PadCaps::new("src", &any).with_fixed(Some(&fixed)),
            &PadCaps::new("sink", &sink),
        )
        .unwrap();
        assert_eq!(result.first().unwrap().get_int("rate"), Some(44100));
    }

    #[test]
    fn test_any_against_any() {
        let any = Caps::new_any();
        let result = negotiate(&PadCaps::new("a", &any), &PadCaps::new("b", &any)).unwrap();
        assert!(result.is_any());
    }
}
