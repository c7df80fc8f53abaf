//! Tests for the process-wide registry.
//!
//! Kept in their own test binary: `deinit` affects every thread of the
//! process, so these must not share one with other tests.

use mediagraph::caps::Caps;
use mediagraph::discoverer::{Discoverer, DiscovererConfig};
use mediagraph::element::{ElementImpl, PadTemplate};
use mediagraph::{Error, State};

struct NullSink;

impl ElementImpl for NullSink {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![PadTemplate::sink(Caps::new_any())]
    }
}

#[test]
fn test_init_lifecycle() {
    mediagraph::deinit();
    assert!(!mediagraph::is_initialized());
    assert!(matches!(mediagraph::registry(), Err(Error::NotInitialized)));
    assert!(matches!(
        mediagraph::parse_launch("testsrc ! fakesink"),
        Err(Error::NotInitialized)
    ));
    assert!(matches!(
        Discoverer::new(DiscovererConfig::default()),
        Err(Error::NotInitialized)
    ));
    assert!(matches!(
        mediagraph::register_element("nullsink", "Drops data", || Ok(Box::new(NullSink))),
        Err(Error::NotInitialized)
    ));

    mediagraph::init();
    mediagraph::init();
    assert!(mediagraph::is_initialized());
    mediagraph::register_element("nullsink", "Drops data", || Ok(Box::new(NullSink))).unwrap();

    let info = mediagraph::registry().unwrap().factory_info("nullsink").unwrap();
    assert_eq!(info.description, "Drops data");

    let mut pipeline = mediagraph::parse_launch("testsrc num-buffers=3 ! nullsink").unwrap();
    pipeline.set_state(State::Paused).unwrap();
    pipeline.set_state(State::Null).unwrap();

    // Pipelines built earlier survive deinit.
    mediagraph::deinit();
    pipeline.set_state(State::Ready).unwrap();
    pipeline.set_state(State::Null).unwrap();

    // A fresh init starts from the built-ins only.
    mediagraph::init();
    assert!(matches!(
        mediagraph::parse_launch("testsrc ! nullsink"),
        Err(Error::FactoryNotFound(name)) if name == "nullsink"
    ));
    assert!(Discoverer::new(DiscovererConfig::default()).is_ok());
}
