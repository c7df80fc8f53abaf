//! Test source and sink elements.
//!
//! - [`TestSrc`]: generates timestamped buffers
//! - [`FakeSink`]: discards everything, optionally prerolling asynchronously

mod fakesink;
mod testsrc;

pub use fakesink::FakeSink;
pub use testsrc::{DEFAULT_AUDIO_CAPS, DEFAULT_VIDEO_CAPS, TestSrc};
