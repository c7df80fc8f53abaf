//! Process-wide bootstrap.
//!
//! [`init`] installs the global element registry with the built-in
//! elements and describes the metrics; [`deinit`] drops the registry.
//! Everything else in the crate works without them: a local
//! [`ElementFactory`] can be built and used directly.

use crate::error::{Error, Result};
use crate::observability;
use crate::pipeline::{ElementConstructor, ElementFactory, Pipeline};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

static REGISTRY: RwLock<Option<ElementFactory>> = RwLock::new(None);

fn read() -> RwLockReadGuard<'static, Option<ElementFactory>> {
    REGISTRY.read().unwrap_or_else(PoisonError::into_inner)
}

fn write() -> RwLockWriteGuard<'static, Option<ElementFactory>> {
    REGISTRY.write().unwrap_or_else(PoisonError::into_inner)
}

/// Initialize the library. Calling it again is a no-op.
pub fn init() {
    let mut registry = write();
    if registry.is_some() {
        return;
    }
    observability::init_metrics();
    let factory = ElementFactory::with_builtins();
    info!(elements = factory.list().len(), "mediagraph initialized");
    *registry = Some(factory);
}

/// Drop the global registry. Pipelines and elements already built keep
/// working; creating new ones through the registry fails with
/// [`Error::NotInitialized`] until [`init`] is called again.
pub fn deinit() {
    if write().take().is_some() {
        debug!("mediagraph deinitialized");
    }
}

/// Whether [`init`] has run (and [`deinit`] has not).
pub fn is_initialized() -> bool {
    read().is_some()
}

/// A snapshot of the global registry.
pub fn registry() -> Result<ElementFactory> {
    read().clone().ok_or(Error::NotInitialized)
}

/// Add an element kind to the global registry.
pub fn register_element(name: &str, description: &'static str, constructor: ElementConstructor) -> Result<()> {
    write()
        .as_mut()
        .ok_or(Error::NotInitialized)?
        .register(name, description, constructor);
    debug!(factory = name, "element registered");
    Ok(())
}

/// Build a pipeline from a launch line using the global registry.
///
/// ```rust,ignore
/// mediagraph::init();
/// let mut pipeline = mediagraph::parse_launch("testsrc num-buffers=10 ! fakesink")?;
/// pipeline.set_state(mediagraph::State::Playing)?;
/// ```
pub fn parse_launch(description: &str) -> Result<Pipeline> {
    crate::pipeline::launch(&registry()?, description)
}
