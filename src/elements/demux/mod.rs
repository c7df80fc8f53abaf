//! Demultiplexing elements.
//!
//! - [`Demux`]: splits one input into streams announced as sometimes pads

use super::flow::combine_flows;
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    ElementContext, ElementImpl, FlowError, FlowResult, PadDirection, PadPresence, PadTemplate,
    PropertyKind, PropertySpec, PropertyValue,
};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Streams announced by default: one video and one audio stream.
pub const DEFAULT_STREAMS: &str =
    "video/x-raw, width=320, height=240, framerate=30/1; audio/x-raw, rate=48000, channels=2";

const DEFAULT_LINK_TIMEOUT_MS: i64 = 500;

struct Settings {
    streams: Caps,
    link_timeout: Duration,
}

/// A demuxer that discovers its output streams from the data.
///
/// On the first buffer it creates one `src_%u` pad per structure of its
/// `streams` property and announces each with a pad-added message. It then
/// waits up to `link-timeout-ms` for the application to link them, and
/// pushes every input buffer to all outputs. Results are combined like the
/// tee's: one output taking the buffer is enough, and the push fails with
/// `not-linked` only if no output is linked.
///
/// Pads are announced once per element lifetime.
pub struct Demux {
    settings: Mutex<Settings>,
    announced: AtomicBool,
}

impl Default for Demux {
    fn default() -> Self {
        Self {
            settings: Mutex::new(Settings {
                streams: DEFAULT_STREAMS.parse().unwrap_or_else(|_| Caps::new_any()),
                link_timeout: Duration::from_millis(DEFAULT_LINK_TIMEOUT_MS as u64),
            }),
            announced: AtomicBool::new(false),
        }
    }
}

impl Demux {
    /// Create a demuxer with the default streams.
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, ctx: &ElementContext) -> std::result::Result<(), FlowError> {
        let (streams, timeout) = {
            let settings = self.settings();
            (settings.streams.clone(), settings.link_timeout)
        };
        let mut created = 0usize;
        for structure in streams.structures() {
            match ctx.add_pad("src_%u", Caps::from_structure(structure.clone())) {
                Ok(pad) => {
                    debug!(element = %ctx.name(), pad = %pad, caps = %structure, "stream found");
                    created += 1;
                }
                Err(err) => {
                    ctx.post_error("could not create stream pad", Some(err.to_string()));
                    return Err(FlowError::Error);
                }
            }
        }
        if created == 0 {
            warn!(element = %ctx.name(), "no streams to expose");
            return Ok(());
        }

        // Give pad-added handlers on the application thread time to link.
        ctx.wait_src_linked(created, timeout)
    }
}

impl ElementImpl for Demux {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![
            PadTemplate::sink(Caps::new_any()),
            PadTemplate::new("src_%u", PadDirection::Src, PadPresence::Sometimes, Caps::new_any()),
        ]
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::new(
                "streams",
                PropertyKind::Caps,
                DEFAULT_STREAMS.parse::<Caps>().unwrap_or_else(|_| Caps::new_any()),
                "One output stream per structure",
            ),
            PropertySpec::new(
                "link-timeout-ms",
                PropertyKind::Int,
                DEFAULT_LINK_TIMEOUT_MS,
                "How long to wait for announced pads to be linked",
            ),
        ]
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        let mut settings = self.settings();
        match name {
            "streams" => settings.streams = value.as_caps().unwrap_or_else(Caps::new_empty),
            "link-timeout-ms" => {
                let ms = value.as_i64().and_then(|v| u64::try_from(v).ok()).unwrap_or(0);
                settings.link_timeout = Duration::from_millis(ms);
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
        let settings = self.settings();
        match name {
            "streams" => Some(PropertyValue::Caps(settings.streams.clone())),
            "link-timeout-ms" => Some(PropertyValue::Integer(settings.link_timeout.as_millis() as i64)),
            _ => None,
        }
    }

    fn chain(&self, ctx: &ElementContext, _pad: &str, buffer: Buffer) -> FlowResult {
        if !self.announced.swap(true, Ordering::AcqRel) {
            self.announce(ctx)?;
        }

        let results: Vec<FlowResult> = ctx
            .src_pads()
            .iter()
            .map(|pad| {
                let result = ctx.push(pad, buffer.clone());
                trace!(element = %ctx.name(), pad = %pad, ?result, "stream");
                result
            })
            .collect();
        combine_flows(&results, false)
    }
}
