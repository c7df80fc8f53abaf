//! Built-in pipeline elements.
//!
//! ## Sources
//! - [`TestSrc`] (`testsrc`): generates timestamped test buffers
//! - [`FileSrc`] (`filesrc`): reads a file in chunks
//!
//! ## Sinks
//! - [`FakeSink`] (`fakesink`): discards all buffers
//!
//! ## Filters
//! - [`Identity`] (`identity`): passes buffers through, optionally failing
//! - [`CapsFilter`] (`capsfilter`): restricts negotiated formats
//! - [`Queue`] (`queue`): thread boundary with bounded buffering
//!
//! ## Routing
//! - [`Tee`] (`tee`): duplicates buffers over request pads
//! - [`Demux`] (`demux`): announces its outputs as sometimes pads

mod demux;
mod flow;
mod io;
mod task;
mod testing;
mod util;

pub use demux::{DEFAULT_STREAMS, Demux};
pub use flow::{LeakyMode, Queue, Tee};
pub use io::FileSrc;
pub use testing::{DEFAULT_AUDIO_CAPS, DEFAULT_VIDEO_CAPS, FakeSink, TestSrc};
pub use util::{CapsFilter, Identity};

use crate::element::PropertyValue;
use crate::error::{Error, Result};
use crate::pipeline::ElementFactory;

/// Largest `blocksize` the built-in sources accept, in bytes.
pub const MAX_BLOCKSIZE: i64 = 64 * 1024 * 1024;

/// Read a `blocksize` property value, rejecting sizes outside
/// `1..=MAX_BLOCKSIZE`.
pub(crate) fn blocksize(value: &PropertyValue) -> Result<usize> {
    value
        .as_i64()
        .filter(|size| (1..=MAX_BLOCKSIZE).contains(size))
        .and_then(|size| usize::try_from(size).ok())
        .ok_or_else(|| Error::InvalidValue {
            element: String::new(),
            property: "blocksize".to_string(),
            reason: format!("{} is not between 1 and {MAX_BLOCKSIZE}", value.describe()),
        })
}

/// Register every built-in element kind with `factory`.
pub(crate) fn register_builtins(factory: &mut ElementFactory) {
    factory.register_uri_handler("testsrc", "Generates test buffers", &["test"], || {
        Ok(Box::new(TestSrc::new()))
    });
    factory.register_uri_handler("filesrc", "Reads a file", &["file"], || {
        Ok(Box::new(FileSrc::new()))
    });
    factory.register("fakesink", "Discards all buffers", || Ok(Box::new(FakeSink::new())));
    factory.register("identity", "Passes buffers through", || Ok(Box::new(Identity::new())));
    factory.register("capsfilter", "Restricts negotiated formats", || {
        Ok(Box::new(CapsFilter::new()))
    });
    factory.register("queue", "Buffers data across a thread boundary", || {
        Ok(Box::new(Queue::new()))
    });
    factory.register("tee", "Duplicates buffers to several branches", || {
        Ok(Box::new(Tee::new()))
    });
    factory.register("demux", "Splits input into announced streams", || {
        Ok(Box::new(Demux::new()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let factory = ElementFactory::with_builtins();
        assert_eq!(
            factory.list(),
            [
                "capsfilter",
                "demux",
                "fakesink",
                "filesrc",
                "identity",
                "queue",
                "tee",
                "testsrc"
            ]
        );
        assert_eq!(factory.factory_info("testsrc").unwrap().protocols, ["test"]);
    }

    #[test]
    fn test_blocksize_bounds() {
        for kind in ["testsrc", "filesrc"] {
            let src = ElementFactory::with_builtins().make(kind, Some("src")).unwrap();
            src.set_property("blocksize", 1024).unwrap();
            assert_eq!(src.property("blocksize"), Some(PropertyValue::Integer(1024)));

            for size in [0, -1, MAX_BLOCKSIZE + 1, i64::MAX] {
                let err = src.set_property("blocksize", size).unwrap_err();
                assert!(
                    matches!(&err, Error::InvalidValue { element, property, .. } if element == "src" && property == "blocksize"),
                    "{err}"
                );
            }
            assert_eq!(src.property("blocksize"), Some(PropertyValue::Integer(1024)));
        }
    }
}
