//! Element properties.
//!
//! Elements declare their properties with [`PropertySpec`]s. Values arrive
//! as [`PropertyValue`]s, either typed by the application or as loosely
//! typed tokens from a launch line, and are coerced to the declared
//! [`PropertyKind`] before the element sees them.

use crate::caps::Caps;
use std::fmt;

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// 64-bit signed integer.
    Int,
    /// Floating point.
    Float,
    /// Boolean.
    Bool,
    /// String.
    String,
    /// Caps.
    Caps,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PropertyKind::Int => "int",
            PropertyKind::Float => "float",
            PropertyKind::Bool => "boolean",
            PropertyKind::String => "string",
            PropertyKind::Caps => "caps",
        })
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
    /// A caps value.
    Caps(Caps),
}

impl PropertyValue {
    /// Get as a string, converting if necessary.
    pub fn as_string(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Caps(c) => c.to_string(),
        }
    }

    /// Try to get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Try to get as caps, parsing strings.
    pub fn as_caps(&self) -> Option<Caps> {
        match self {
            PropertyValue::Caps(c) => Some(c.clone()),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Convert to `kind`, or `None` if the value does not fit.
    pub fn coerce(&self, kind: PropertyKind) -> Option<PropertyValue> {
        match kind {
            PropertyKind::Int => self.as_i64().map(PropertyValue::Integer),
            PropertyKind::Float => self.as_f64().map(PropertyValue::Float),
            PropertyKind::Bool => self.as_bool().map(PropertyValue::Bool),
            PropertyKind::String => Some(PropertyValue::String(self.as_string())),
            PropertyKind::Caps => self.as_caps().map(PropertyValue::Caps),
        }
    }

    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            PropertyValue::String(s) => format!("string \"{s}\""),
            PropertyValue::Integer(i) => format!("int {i}"),
            PropertyValue::Float(f) => format!("float {f}"),
            PropertyValue::Bool(b) => format!("boolean {b}"),
            PropertyValue::Caps(c) => format!("caps \"{c}\""),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Integer(v.into())
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<Caps> for PropertyValue {
    fn from(v: Caps) -> Self {
        PropertyValue::Caps(v)
    }
}

/// Declaration of one property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    /// Property name (`num-buffers`).
    pub name: &'static str,
    /// One-line description.
    pub blurb: &'static str,
    /// Declared type.
    pub kind: PropertyKind,
    /// Value before anything is set.
    pub default: Option<PropertyValue>,
    /// Whether the application may set it.
    pub writable: bool,
    /// Whether the element refuses to leave NULL while it is unset.
    pub required: bool,
}

impl PropertySpec {
    /// A writable property with a default.
    pub fn new(
        name: &'static str,
        kind: PropertyKind,
        default: impl Into<PropertyValue>,
        blurb: &'static str,
    ) -> Self {
        Self {
            name,
            blurb,
            kind,
            default: Some(default.into()),
            writable: true,
            required: false,
        }
    }

    /// A writable property with no default that must be set before READY.
    pub fn required(name: &'static str, kind: PropertyKind, blurb: &'static str) -> Self {
        Self {
            name,
            blurb,
            kind,
            default: None,
            writable: true,
            required: true,
        }
    }

    /// Mark as read-only.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}
