//! Element factory: named constructors for element kinds.

use crate::element::{Element, ElementImpl, PadTemplate, PropertySpec, PropertyValue};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Type alias for element constructor functions.
pub type ElementConstructor = fn() -> Result<Box<dyn ElementImpl>>;

#[derive(Clone)]
struct FactoryEntry {
    description: &'static str,
    constructor: ElementConstructor,
    protocols: Vec<&'static str>,
}

/// Static description of an element kind.
#[derive(Debug, Clone)]
pub struct FactoryInfo {
    /// Factory name.
    pub name: String,
    /// One-line description.
    pub description: &'static str,
    /// URI schemes the kind handles as a source.
    pub protocols: Vec<&'static str>,
    /// Pad templates.
    pub pad_templates: Vec<PadTemplate>,
    /// Properties.
    pub properties: Vec<PropertySpec>,
}

/// Registry of element constructors.
///
/// Clones share the counters used to generate element names, so names
/// stay unique across clones of the process-wide registry.
#[derive(Clone, Default)]
pub struct ElementFactory {
    entries: HashMap<String, FactoryEntry>,
    counters: Arc<Mutex<HashMap<String, u32>>>,
}

impl ElementFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory with the built-in elements registered.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        crate::elements::register_builtins(&mut factory);
        factory
    }

    /// Register an element kind. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, name: &str, description: &'static str, constructor: ElementConstructor) {
        self.register_uri_handler(name, description, &[], constructor);
    }

    /// Register a source kind that can be built from URIs with the given
    /// schemes.
    pub fn register_uri_handler(
        &mut self,
        name: &str,
        description: &'static str,
        protocols: &[&'static str],
        constructor: ElementConstructor,
    ) {
        self.entries.insert(
            name.to_string(),
            FactoryEntry {
                description,
                constructor,
                protocols: protocols.to_vec(),
            },
        );
    }

    /// Check if an element kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// List all registered kinds, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    fn entry(&self, kind: &str) -> Result<&FactoryEntry> {
        self.entries
            .get(kind)
            .ok_or_else(|| Error::FactoryNotFound(kind.to_string()))
    }

    fn next_name(&self, kind: &str) -> String {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters.entry(kind.to_string()).or_insert(0);
        let name = format!("{kind}{counter}");
        *counter += 1;
        name
    }

    fn instantiate(&self, kind: &str) -> Result<Box<dyn ElementImpl>> {
        let entry = self.entry(kind)?;
        (entry.constructor)().map_err(|err| match err {
            Error::InstantiationFailed { .. } => err,
            other => Error::InstantiationFailed {
                factory: kind.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Build an element. `name` defaults to the kind followed by a counter
    /// (`fakesink0`).
    pub fn make(&self, kind: &str, name: Option<&str>) -> Result<Element> {
        let imp = self.instantiate(kind)?;
        let name = name.map_or_else(|| self.next_name(kind), str::to_string);
        debug!(factory = kind, element = %name, "element created");
        Ok(Element::from_boxed(kind, &name, imp))
    }

    /// Build an element and set properties on it.
    pub fn make_with_properties(
        &self,
        kind: &str,
        name: Option<&str>,
        properties: &[(&str, PropertyValue)],
    ) -> Result<Element> {
        let element = self.make(kind, name)?;
        for (property, value) in properties {
            element.set_property(property, value.clone())?;
        }
        Ok(element)
    }

    /// Build a source for `uri`, picked by the URI scheme.
    pub fn make_from_uri(&self, uri: &str, name: Option<&str>) -> Result<Element> {
        let scheme = uri_scheme(uri).ok_or_else(|| Error::InvalidUri(uri.to_string()))?;
        let mut handlers: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.protocols.iter().any(|p| p.eq_ignore_ascii_case(scheme)))
            .map(|(kind, _)| kind.clone())
            .collect();
        handlers.sort();
        let kind = handlers
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoUriHandler(scheme.to_string()))?;
        let element = self.make(&kind, name)?;
        element.core().set_uri(uri)?;
        Ok(element)
    }

    /// Describe an element kind: pad templates, properties and protocols.
    pub fn factory_info(&self, kind: &str) -> Result<FactoryInfo> {
        let entry = self.entry(kind)?;
        let imp = self.instantiate(kind)?;
        Ok(FactoryInfo {
            name: kind.to_string(),
            description: entry.description,
            protocols: entry.protocols.clone(),
            pad_templates: imp.pad_templates(),
            properties: imp.properties(),
        })
    }
}

impl std::fmt::Debug for ElementFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementFactory")
            .field("kinds", &self.list())
            .finish()
    }
}

/// Scheme of `uri`, or `None` if it has no valid `scheme://` prefix.
fn uri_scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Caps;
    use crate::element::{PadDirection, PadPresence};

    struct Dummy;
    impl ElementImpl for Dummy {
        fn pad_templates(&self) -> Vec<PadTemplate> {
            vec![PadTemplate::src(Caps::new_any())]
        }
    }

    fn failing() -> Result<Box<dyn ElementImpl>> {
        Err(Error::Parse("no device".into()))
    }

    #[test]
    fn test_unknown_kind() {
        let factory = ElementFactory::new();
        assert!(matches!(
            factory.make("nosuch", None),
            Err(Error::FactoryNotFound(kind)) if kind == "nosuch"
        ));
    }

    #[test]
    fn test_generated_names() {
        let mut factory = ElementFactory::new();
        factory.register("dummy", "test", || Ok(Box::new(Dummy)));
        let clone = factory.clone();
        assert_eq!(factory.make("dummy", None).unwrap().name(), "dummy0");
        assert_eq!(clone.make("dummy", None).unwrap().name(), "dummy1");
        assert_eq!(factory.make("dummy", Some("mine")).unwrap().name(), "mine");
    }

    #[test]
    fn test_instantiation_failure() {
        let mut factory = ElementFactory::new();
        factory.register("broken", "test", failing);
        let err = factory.make("broken", None).unwrap_err();
        assert!(matches!(err, Error::InstantiationFailed { factory, .. } if factory == "broken"));
    }

    #[test]
    fn test_uri_scheme() {
        assert_eq!(uri_scheme("file:///tmp/x"), Some("file"));
        assert_eq!(uri_scheme("test://video"), Some("test"));
        assert_eq!(uri_scheme("/tmp/x"), None);
        assert_eq!(uri_scheme("://x"), None);
        assert_eq!(uri_scheme("1a://x"), None);
    }

    #[test]
    fn test_make_from_uri_errors() {
        let factory = ElementFactory::with_builtins();
        assert!(matches!(factory.make_from_uri("not a uri", None), Err(Error::InvalidUri(_))));
        assert!(matches!(
            factory.make_from_uri("rtsp://camera/1", None),
            Err(Error::NoUriHandler(scheme)) if scheme == "rtsp"
        ));
        let src = factory.make_from_uri("file:///tmp/input.bin", None).unwrap();
        assert_eq!(src.factory_name(), "filesrc");
        assert_eq!(
            src.property("location"),
            Some(PropertyValue::String("/tmp/input.bin".into()))
        );
    }

    #[test]
    fn test_factory_info() {
        let factory = ElementFactory::with_builtins();
        let info = factory.factory_info("tee").unwrap();
        assert!(info.pad_templates.iter().any(|t| t.direction == PadDirection::Src
            && t.presence == PadPresence::Request));
        assert!(info.properties.iter().any(|p| p.name == "allow-not-linked"));
        assert!(factory.list().contains(&"fakesink".to_string()));
    }
}
