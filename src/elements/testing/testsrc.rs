//! TestSrc element for generating timestamped test buffers.
//!
//! Produces fixed-size buffers on its own streaming thread, stamped from
//! the framerate of its caps (20 ms per buffer when the caps have none).
//! Answers position, duration and seeking queries and handles seeks.

use super::super::task::{StreamingTask, TaskControl};
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::clock::ClockTime;
use crate::element::{
    ElementContext, ElementImpl, FlowError, PadTemplate, PropertyKind, PropertySpec, PropertyValue,
    State, StateChange, StateChangeSuccess,
};
use crate::error::{Error, Result};
use crate::event::{Event, Query, SeekEvent, SeekFlags};
use crate::observability;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Default caps of a test source.
pub const DEFAULT_VIDEO_CAPS: &str = "video/x-raw, width=320, height=240, framerate=30/1";
/// Caps used for `test://audio`.
pub const DEFAULT_AUDIO_CAPS: &str = "audio/x-raw, rate=48000, channels=2";

/// Keyframe distance, in buffers, used by key-unit seeks.
const KEYFRAME_INTERVAL: u64 = 30;
/// Buffer duration when the caps carry no framerate.
const DEFAULT_BUFFER_DURATION: ClockTime = ClockTime::from_millis(20);
/// Start-up delay of `test://stall`.
const STALL_LATENCY_MS: i64 = 3_600_000;

#[derive(Debug, Clone)]
struct Settings {
    caps: Caps,
    num_buffers: i64,
    blocksize: usize,
    interval: Duration,
    latency: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            caps: DEFAULT_VIDEO_CAPS.parse().unwrap_or_else(|_| Caps::new_any()),
            num_buffers: -1,
            blocksize: 4096,
            interval: Duration::ZERO,
            latency: Duration::ZERO,
        }
    }
}

impl Settings {
    fn buffer_duration(&self) -> ClockTime {
        self.caps
            .first()
            .and_then(|s| s.get_fraction("framerate"))
            .and_then(|f| ClockTime::frame_duration(f.numer(), f.denom()))
            .unwrap_or(DEFAULT_BUFFER_DURATION)
    }

    fn duration(&self) -> Option<ClockTime> {
        u64::try_from(self.num_buffers)
            .ok()
            .map(|n| self.buffer_duration().saturating_mul(n))
    }
}

#[derive(Default)]
struct Shared {
    settings: Mutex<Settings>,
    /// Index of the next buffer.
    next: Mutex<u64>,
}

impl Shared {
    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next(&self) -> MutexGuard<'_, u64> {
        self.next.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A source that generates test buffers.
///
/// # Properties
///
/// | Name | Type | Default |
/// |------|------|---------|
/// | `caps` | caps | `video/x-raw, width=320, height=240, framerate=30/1` |
/// | `num-buffers` | int | -1 (endless) |
/// | `blocksize` | int | 4096 |
/// | `interval-ms` | int | 0 |
/// | `latency-ms` | int | 0 |
///
/// URIs: `test://video`, `test://audio` and `test://stall` (never produces
/// data), optionally followed by `?num-buffers=N`.
#[derive(Default)]
pub struct TestSrc {
    shared: Arc<Shared>,
    task: Mutex<Option<StreamingTask>>,
}

impl TestSrc {
    /// Create a new test source with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&self, ctx: &ElementContext) -> Result<()> {
        let shared = self.shared.clone();
        let ctx = ctx.clone();
        let task = StreamingTask::spawn(&format!("{}:src", ctx.name()), move |control| {
            stream(&shared, &ctx, &control);
        })?;
        if let Some(old) = self.task.lock().unwrap_or_else(PoisonError::into_inner).replace(task) {
            old.stop();
        }
        Ok(())
    }

    fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.stop();
        }
    }

    fn seek(&self, ctx: &ElementContext, seek: SeekEvent) -> bool {
        let frame = self.shared.settings().buffer_duration();
        let Some(mut index) = seek.position.checked_div_time(frame) else {
            return false;
        };
        if seek.flags.contains(SeekFlags::KEY_UNIT) && !seek.flags.contains(SeekFlags::ACCURATE) {
            index -= index % KEYFRAME_INTERVAL;
        }
        debug!(element = %ctx.name(), position = %seek.position, index, "seeking");

        if !seek.is_flushing() {
            *self.shared.next() = index;
            return true;
        }

        ctx.push_event(Event::FlushStart);
        self.stop();
        *self.shared.next() = index;
        ctx.push_event(Event::FlushStop);
        if ctx.state() >= State::Paused {
            if let Err(err) = self.start(ctx) {
                ctx.post_error("could not restart streaming", Some(err.to_string()));
                return false;
            }
        }
        true
    }
}

fn stream(shared: &Shared, ctx: &ElementContext, control: &TaskControl) {
    let _span = observability::span_element(ctx.name(), "testsrc").entered();
    let latency = shared.settings().latency;
    if !latency.is_zero() && control.sleep(latency) {
        return;
    }
    loop {
        if control.is_stopped() {
            return;
        }
        let settings = shared.settings().clone();
        let index = {
            let mut next = shared.next();
            let index = *next;
            *next += 1;
            index
        };
        if u64::try_from(settings.num_buffers).is_ok_and(|n| index >= n) {
            debug!(element = %ctx.name(), buffers = index, "end of stream");
            ctx.push_event(Event::Eos);
            return;
        }

        let frame = settings.buffer_duration();
        let buffer = Buffer::new(vec![(index % 256) as u8; settings.blocksize])
            .with_timing(Some(frame.saturating_mul(index)), Some(frame))
            .with_offset(index);
        trace!(element = %ctx.name(), index, "pushing");
        match ctx.push("src", buffer) {
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
        if !settings.interval.is_zero() && control.sleep(settings.interval) {
            return;
        }
    }
}

fn millis(value: &PropertyValue) -> Duration {
    Duration::from_millis(value.as_i64().and_then(|v| u64::try_from(v).ok()).unwrap_or(0))
}

impl ElementImpl for TestSrc {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![PadTemplate::src(Caps::new_any())]
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::new("caps", PropertyKind::Caps, Settings::default().caps, "Caps of the produced buffers"),
            PropertySpec::new("num-buffers", PropertyKind::Int, -1, "Buffers to produce before EOS (-1 = endless)"),
            PropertySpec::new("blocksize", PropertyKind::Int, 4096, "Size of each buffer in bytes"),
            PropertySpec::new("interval-ms", PropertyKind::Int, 0, "Pause between buffers"),
            PropertySpec::new("latency-ms", PropertyKind::Int, 0, "Delay before the first buffer"),
        ]
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        let mut settings = self.shared.settings();
        match name {
            "caps" => settings.caps = value.as_caps().unwrap_or_else(Caps::new_any),
            "num-buffers" => settings.num_buffers = value.as_i64().unwrap_or(-1),
            "blocksize" => settings.blocksize = crate::elements::blocksize(value)?,
            "interval-ms" => settings.interval = millis(value),
            "latency-ms" => settings.latency = millis(value),
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
        let settings = self.shared.settings();
        Some(match name {
            "caps" => PropertyValue::Caps(settings.caps.clone()),
            "num-buffers" => PropertyValue::Integer(settings.num_buffers),
            "blocksize" => PropertyValue::Integer(settings.blocksize as i64),
            "interval-ms" => PropertyValue::Integer(settings.interval.as_millis() as i64),
            "latency-ms" => PropertyValue::Integer(settings.latency.as_millis() as i64),
            _ => return None,
        })
    }

    fn set_uri(&self, uri: &str) -> Result<()> {
        let rest = uri
            .strip_prefix("test://")
            .ok_or_else(|| Error::InvalidUri(uri.to_string()))?;
        let (kind, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut settings = self.shared.settings();
        match kind {
            "video" => settings.caps = DEFAULT_VIDEO_CAPS.parse()?,
            "audio" => settings.caps = DEFAULT_AUDIO_CAPS.parse()?,
            "stall" => settings.latency = Duration::from_millis(STALL_LATENCY_MS as u64),
            _ => return Err(Error::InvalidUri(uri.to_string())),
        }
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("num-buffers", n)) => {
                    settings.num_buffers = n.parse().map_err(|_| Error::InvalidUri(uri.to_string()))?;
                }
                _ => return Err(Error::InvalidUri(uri.to_string())),
            }
        }
        Ok(())
    }

    fn query_caps(&self, _pad: &str, _template: &PadTemplate) -> Caps {
        self.shared.settings().caps.clone()
    }

    fn change_state(&self, ctx: &ElementContext, transition: StateChange) -> Result<StateChangeSuccess> {
        match transition {
            StateChange::READY_TO_PAUSED => {
                *self.shared.next() = 0;
                self.start(ctx)?;
            }
            StateChange::PAUSED_TO_READY => self.stop(),
            _ => {}
        }
        Ok(StateChangeSuccess::Success)
    }

    fn src_event(&self, ctx: &ElementContext, event: Event) -> bool {
        match event {
            Event::Seek(seek) => self.seek(ctx, seek),
            _ => false,
        }
    }

    fn query(&self, _ctx: &ElementContext, query: &mut Query) -> bool {
        let settings = self.shared.settings();
        match query {
            Query::Position(position) => {
                let next = *self.shared.next();
                *position = Some(settings.buffer_duration().saturating_mul(next));
                true
            }
            Query::Duration(duration) => {
                *duration = settings.duration();
                duration.is_some()
            }
            Query::Seeking { seekable, start, end } => {
                *seekable = true;
                *start = ClockTime::ZERO;
                *end = settings.duration();
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_duration_from_framerate() {
        let settings = Settings::default();
        assert_eq!(settings.buffer_duration(), ClockTime::frame_duration(30, 1).unwrap());
        assert_eq!(settings.duration(), None);

        let audio = Settings {
            caps: DEFAULT_AUDIO_CAPS.parse().unwrap(),
            num_buffers: 50,
            ..Settings::default()
        };
        assert_eq!(audio.buffer_duration(), ClockTime::from_millis(20));
        assert_eq!(audio.duration(), Some(ClockTime::from_secs(1)));
    }

    #[test]
    fn test_uri() {
        let src = TestSrc::new();
        src.set_uri("test://audio?num-buffers=5").unwrap();
        assert_eq!(src.property("num-buffers"), Some(PropertyValue::Integer(5)));
        assert!(src.shared.settings().caps.first().unwrap().name() == "audio/x-raw");
        assert!(matches!(src.set_uri("test://nothing"), Err(Error::InvalidUri(_))));
        assert!(matches!(src.set_uri("test://video?bogus"), Err(Error::InvalidUri(_))));
    }

    #[test]
    fn test_seeking_query() {
        let src = TestSrc::new();
        src.set_property("num-buffers", &PropertyValue::Integer(300)).unwrap();
        let ctx = ElementContext::new(std::sync::Weak::new(), "src".into());
        let mut query = Query::seeking();
        assert!(src.query(&ctx, &mut query));
        assert_eq!(
            query,
            Query::Seeking {
                seekable: true,
                start: ClockTime::ZERO,
                end: Some(ClockTime::frame_duration(30, 1).unwrap().saturating_mul(300)),
            }
        );
    }
}
