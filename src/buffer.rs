//! Data buffers exchanged between elements.

use crate::clock::ClockTime;
use bytes::Bytes;

/// A chunk of media data with timing.
///
/// The payload is reference counted, so cloning a buffer (for example in a
/// tee) does not copy data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Bytes,
    pts: Option<ClockTime>,
    duration: Option<ClockTime>,
    offset: u64,
}

impl Buffer {
    /// Create a buffer without timestamps.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Create a zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    /// Set presentation timestamp and duration.
    pub fn with_timing(mut self, pts: Option<ClockTime>, duration: Option<ClockTime>) -> Self {
        self.pts = pts;
        self.duration = duration;
        self
    }

    /// Set the media-specific offset (frame index or byte offset).
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Payload bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Presentation timestamp.
    pub fn pts(&self) -> Option<ClockTime> {
        self.pts
    }

    /// Duration.
    pub fn duration(&self) -> Option<ClockTime> {
        self.duration
    }

    /// Media-specific offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// End of the buffer in stream time (`pts + duration`), if both are known.
    pub fn end_time(&self) -> Option<ClockTime> {
        Some(self.pts? + self.duration?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing() {
        let buf = Buffer::zeroed(16).with_timing(
            Some(ClockTime::from_millis(40)),
            Some(ClockTime::from_millis(40)),
        );
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.end_time(), Some(ClockTime::from_millis(80)));

        let untimed = Buffer::new(&b"abc"[..]);
        assert_eq!(untimed.end_time(), None);
        assert_eq!(untimed.data().as_ref(), b"abc");
    }

    #[test]
    fn test_clone_shares_payload() {
        let buf = Buffer::zeroed(1024);
        let copy = buf.clone();
        assert_eq!(buf.data().as_ptr(), copy.data().as_ptr());
    }
}
