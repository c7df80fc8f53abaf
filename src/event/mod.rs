//! Events and queries.
//!
//! Events travel alongside buffers. Downstream events ([`Event::Eos`], the
//! flush pair) follow the data; the seek event travels against it, from the
//! pipeline into its source elements. Queries ask elements about position,
//! duration and seekability.

use crate::clock::ClockTime;
use bitflags::bitflags;

bitflags! {
    /// Seek behaviour.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SeekFlags: u32 {
        /// Discard in-flight data before seeking.
        const FLUSH = 1 << 0;
        /// Land exactly on the requested position.
        const ACCURATE = 1 << 1;
        /// Snap to the nearest preceding key unit.
        const KEY_UNIT = 1 << 2;
    }
}

/// Seek request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekEvent {
    /// Target position in stream time.
    pub position: ClockTime,
    /// Seek flags.
    pub flags: SeekFlags,
}

impl SeekEvent {
    /// Flushing key-unit seek, the common case for interactive seeking.
    pub fn simple(position: ClockTime) -> Self {
        Self {
            position,
            flags: SeekFlags::FLUSH | SeekFlags::KEY_UNIT,
        }
    }

    /// Whether this seek discards in-flight data.
    pub fn is_flushing(&self) -> bool {
        self.flags.contains(SeekFlags::FLUSH)
    }
}

/// Out-of-band signal carried between elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// No more data will follow on this pad.
    Eos,
    /// Start discarding data; unblocks anything waiting downstream.
    FlushStart,
    /// Resume normal data flow after a flush.
    FlushStop,
    /// Reposition the stream.
    Seek(SeekEvent),
}

impl Event {
    /// Whether this event travels with the data.
    pub fn is_downstream(&self) -> bool {
        !matches!(self, Event::Seek(_))
    }

    /// Whether the event bypasses queued data.
    pub fn is_flush(&self) -> bool {
        matches!(self, Event::FlushStart | Event::FlushStop)
    }

    /// Short name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Eos => "eos",
            Event::FlushStart => "flush-start",
            Event::FlushStop => "flush-stop",
            Event::Seek(_) => "seek",
        }
    }
}

/// Questions the pipeline asks its elements.
///
/// An element answers by filling in the fields and returning `true` from
/// [`crate::element::ElementImpl::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Current playback position.
    Position(Option<ClockTime>),
    /// Total stream duration.
    Duration(Option<ClockTime>),
    /// Seekability and the seekable range.
    Seeking {
        /// Whether the stream can be seeked at all.
        seekable: bool,
        /// Start of the seekable range.
        start: ClockTime,
        /// End of the seekable range, if known.
        end: Option<ClockTime>,
    },
}

impl Query {
    /// Empty position query.
    pub fn position() -> Self {
        Query::Position(None)
    }

    /// Empty duration query.
    pub fn duration() -> Self {
        Query::Duration(None)
    }

    /// Empty seeking query.
    pub fn seeking() -> Self {
        Query::Seeking {
            seekable: false,
            start: ClockTime::ZERO,
            end: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_seek_flags() {
        let seek = SeekEvent::simple(ClockTime::from_secs(30));
        assert!(seek.is_flushing());
        assert!(seek.flags.contains(SeekFlags::KEY_UNIT));
        assert!(!seek.flags.contains(SeekFlags::ACCURATE));
        assert_eq!(seek.position.secs(), 30);
    }

    #[test]
    fn test_event_direction() {
        assert!(Event::Eos.is_downstream());
        assert!(Event::FlushStart.is_flush());
        assert!(!Event::Seek(SeekEvent::simple(ClockTime::ZERO)).is_downstream());
        assert_eq!(Event::FlushStop.name(), "flush-stop");
    }
}
