//! Capabilities: structured descriptions of data formats.
//!
//! A [`Structure`] names a media type (`video/x-raw`) and constrains its
//! attributes. [`Caps`] is an ordered set of alternative structures, most
//! preferred first, plus the two special sets `ANY` and `EMPTY`.
//!
//! # Textual form
//!
//! ```text
//! video/x-raw, width=640, height=480, framerate=30/1
//! audio/x-raw, rate=[ 8000, 48000 ], channels={ 1, 2 }; audio/x-alaw
//! ```
//!
//! ```rust
//! use mediagraph::caps::Caps;
//!
//! let caps: Caps = "video/x-raw,width=640,height=480".parse().unwrap();
//! assert_eq!(caps.to_string(), "video/x-raw, width=640, height=480");
//! assert_eq!(caps.to_string().parse::<Caps>().unwrap(), caps);
//! ```

mod parse;
mod value;

pub use value::{CapsValue, Fraction, Value};

use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// One media type with attribute constraints.
///
/// Attributes keep their declaration order for display; equality ignores it.
#[derive(Clone, Debug)]
pub struct Structure {
    name: String,
    fields: Vec<(String, CapsValue)>,
}

impl Structure {
    /// A structure with no attribute constraints.
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            name: media_type.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style [`Structure::set`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<CapsValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Media type, e.g. `video/x-raw`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the media type starts with `prefix` (`"video/"`).
    pub fn has_name_prefix(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix)
    }

    /// Set or replace an attribute.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<CapsValue>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == field) {
            Some((_, v)) => *v = value,
            None => self.fields.push((field, value)),
        }
    }

    /// Remove an attribute, returning its constraint.
    pub fn remove(&mut self, field: &str) -> Option<CapsValue> {
        let pos = self.fields.iter().position(|(k, _)| k == field)?;
        Some(self.fields.remove(pos).1)
    }

    /// Constraint on `field`, if present.
    pub fn get(&self, field: &str) -> Option<&CapsValue> {
        self.fields.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    /// Fixed value of `field`.
    pub fn value(&self, field: &str) -> Option<&Value> {
        match self.get(field)? {
            CapsValue::Fixed(v) => Some(v),
            _ => None,
        }
    }

    /// Fixed integer value of `field`.
    pub fn get_int(&self, field: &str) -> Option<i64> {
        self.value(field)?.as_int()
    }

    /// Fixed fraction value of `field`.
    pub fn get_fraction(&self, field: &str) -> Option<Fraction> {
        self.value(field)?.as_fraction()
    }

    /// Fixed string value of `field`.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.value(field)?.as_str()
    }

    /// Attributes in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &CapsValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Whether every attribute has a single value.
    pub fn is_fixed(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_fixed())
    }

    /// Common sub-format of two structures, or `None` if the media types
    /// differ or any shared attribute has disjoint constraints.
    ///
    /// Attributes present on one side only are carried over unchanged.
    pub fn intersect(&self, other: &Structure) -> Option<Structure> {
        if self.name != other.name {
            return None;
        }
        let mut out = Structure::new(self.name.clone());
        for (k, v) in &self.fields {
            let merged = match other.get(k) {
                Some(o) => v.intersect(o)?,
                None => v.clone(),
            };
            out.fields.push((k.clone(), merged));
        }
        for (k, v) in &other.fields {
            if self.get(k).is_none() {
                out.fields.push((k.clone(), v.clone()));
            }
        }
        Some(out)
    }

    /// Whether the two structures describe overlapping formats.
    pub fn can_intersect(&self, other: &Structure) -> bool {
        self.name == other.name
            && self.fields.iter().all(|(k, v)| match other.get(k) {
                Some(o) => v.intersect(o).is_some(),
                None => true,
            })
    }

    /// Whether every format described by `self` is also described by `other`.
    pub fn is_subset_of(&self, other: &Structure) -> bool {
        self.name == other.name
            && other.fields.iter().all(|(k, o)| match self.get(k) {
                Some(v) => v.is_subset_of(o),
                None => matches!(o, CapsValue::Any),
            })
    }

    /// Pick a single value for every attribute. Unconstrained attributes
    /// are dropped.
    pub fn fixate(&self) -> Structure {
        Structure {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .filter_map(|(k, v)| v.fixate().map(|v| (k.clone(), CapsValue::Fixed(v))))
                .collect(),
        }
    }

    /// Text with attributes sorted by name, independent of declaration order.
    pub(crate) fn canonical_string(&self) -> String {
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        let mut s = self.name.clone();
        for (k, v) in fields {
            s.push_str(&format!(", {k}={v}"));
        }
        s
    }
}

impl PartialEq for Structure {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (k, v) in &self.fields {
            write!(f, ", {k}={v}")?;
        }
        Ok(())
    }
}

impl FromStr for Structure {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let caps: Caps = s.parse()?;
        match caps.structures() {
            [one] => Ok(one.clone()),
            _ => Err(crate::Error::Parse(format!(
                "expected a single structure, got '{s}'"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Repr {
    Any,
    Alternatives(SmallVec<[Structure; 2]>),
}

/// A set of alternative formats, most preferred first.
#[derive(Clone, Debug, PartialEq)]
pub struct Caps(Repr);

impl Caps {
    /// Accepts every format.
    pub fn new_any() -> Self {
        Caps(Repr::Any)
    }

    /// Accepts nothing.
    pub fn new_empty() -> Self {
        Caps(Repr::Alternatives(SmallVec::new()))
    }

    /// Caps of a single media type with no attribute constraints.
    pub fn new_simple(media_type: impl Into<String>) -> Self {
        Self::from_structure(Structure::new(media_type))
    }

    /// Caps of one structure.
    pub fn from_structure(structure: Structure) -> Self {
        let mut alts = SmallVec::new();
        alts.push(structure);
        Caps(Repr::Alternatives(alts))
    }

    /// Start building single-structure caps.
    pub fn builder(media_type: impl Into<String>) -> CapsBuilder {
        CapsBuilder {
            structure: Structure::new(media_type),
        }
    }

    /// Whether this is `ANY`.
    pub fn is_any(&self) -> bool {
        matches!(self.0, Repr::Any)
    }

    /// Whether this is `EMPTY`.
    pub fn is_empty(&self) -> bool {
        matches!(&self.0, Repr::Alternatives(alts) if alts.is_empty())
    }

    /// Whether this describes exactly one concrete format.
    pub fn is_fixed(&self) -> bool {
        matches!(self.structures(), [s] if s.is_fixed())
    }

    /// The alternatives. Empty for both `ANY` and `EMPTY`.
    pub fn structures(&self) -> &[Structure] {
        match &self.0 {
            Repr::Any => &[],
            Repr::Alternatives(alts) => alts,
        }
    }

    /// The most preferred alternative.
    pub fn first(&self) -> Option<&Structure> {
        self.structures().first()
    }

    /// Append an alternative. No-op on `ANY`.
    pub fn append(&mut self, structure: Structure) {
        if let Repr::Alternatives(alts) = &mut self.0 {
            if !alts.contains(&structure) {
                alts.push(structure);
            }
        }
    }

    /// All formats accepted by both sets.
    ///
    /// Alternatives are ordered by their combined position in both inputs
    /// (sum of indices, then the smaller index, then canonical text), so the
    /// result is the same whichever side is passed first.
    pub fn intersect(&self, other: &Caps) -> Caps {
        let (a, b) = match (&self.0, &other.0) {
            (Repr::Any, _) => return other.clone(),
            (_, Repr::Any) => return self.clone(),
            (Repr::Alternatives(a), Repr::Alternatives(b)) => (a, b),
        };
        let mut candidates: Vec<((usize, usize), String, Structure)> = Vec::new();
        for (i, sa) in a.iter().enumerate() {
            for (j, sb) in b.iter().enumerate() {
                if let Some(s) = sa.intersect(sb) {
                    candidates.push(((i + j, i.min(j)), s.canonical_string(), s));
                }
            }
        }
        candidates.sort_by(|x, y| x.0.cmp(&y.0).then_with(|| x.1.cmp(&y.1)));
        let mut out = Caps::new_empty();
        for (_, _, s) in candidates {
            out.append(s);
        }
        out
    }

    /// Whether the two sets share at least one format.
    pub fn can_intersect(&self, other: &Caps) -> bool {
        match (&self.0, &other.0) {
            (Repr::Any, o) | (o, Repr::Any) => !matches!(o, Repr::Alternatives(a) if a.is_empty()),
            (Repr::Alternatives(a), Repr::Alternatives(b)) => a
                .iter()
                .any(|sa| b.iter().any(|sb| sa.can_intersect(sb))),
        }
    }

    /// Whether every format in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &Caps) -> bool {
        match (&self.0, &other.0) {
            (_, Repr::Any) => true,
            (Repr::Any, _) => false,
            (Repr::Alternatives(a), Repr::Alternatives(b)) => {
                a.iter().all(|sa| b.iter().any(|sb| sa.is_subset_of(sb)))
            }
        }
    }

    /// Reduce to the first alternative with every attribute fixed.
    /// `ANY` and `EMPTY` are returned unchanged.
    pub fn fixate(&self) -> Caps {
        match self.first() {
            Some(s) => Caps::from_structure(s.fixate()),
            None => self.clone(),
        }
    }
}

impl Default for Caps {
    fn default() -> Self {
        Self::new_any()
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Any => f.write_str("ANY"),
            Repr::Alternatives(alts) if alts.is_empty() => f.write_str("EMPTY"),
            Repr::Alternatives(alts) => {
                for (i, s) in alts.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{s}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Caps {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse::parse_caps(s)
    }
}

impl From<Structure> for Caps {
    fn from(s: Structure) -> Self {
        Caps::from_structure(s)
    }
}

impl FromIterator<Structure> for Caps {
    fn from_iter<I: IntoIterator<Item = Structure>>(iter: I) -> Self {
        let mut caps = Caps::new_empty();
        for s in iter {
            caps.append(s);
        }
        caps
    }
}

/// Builder for single-structure [`Caps`].
#[derive(Debug, Clone)]
pub struct CapsBuilder {
    structure: Structure,
}

impl CapsBuilder {
    /// Add a fixed or constrained attribute.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<CapsValue>) -> Self {
        self.structure.set(name, value);
        self
    }

    /// Finish.
    pub fn build(self) -> Caps {
        Caps::from_structure(self.structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(s: &str) -> Caps {
        s.parse().unwrap()
    }

    #[test]
    fn test_builder() {
        let c = Caps::builder("video/x-raw")
            .field("width", 640)
            .field("height", 480)
            .field("framerate", Fraction::new(30, 1))
            .build();
        assert!(c.is_fixed());
        let s = c.first().unwrap();
        assert_eq!(s.get_int("width"), Some(640));
        assert_eq!(s.get_fraction("framerate"), Some(Fraction::new(30, 1)));
    }

    #[test]
    fn test_field_order_does_not_affect_equality() {
        assert_eq!(
            caps("video/x-raw, width=640, height=480"),
            caps("video/x-raw, height=480, width=640")
        );
        assert_ne!(caps("video/x-raw, width=640"), caps("video/x-raw, width=641"));
    }

    #[test]
    fn test_media_type_mismatch() {
        let a = caps("video/x-raw, width=640");
        let b = caps("audio/x-raw, width=640");
        assert!(!a.can_intersect(&b));
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn test_intersect_merges_fields() {
        let a = caps("video/x-raw, width=[ 320, 1920 ]");
        let b = caps("video/x-raw, width=640, format=RGB");
        let i = a.intersect(&b);
        assert_eq!(i, caps("video/x-raw, width=640, format=RGB"));
    }

    #[test]
    fn test_intersect_any_and_empty() {
        let a = caps("video/x-raw");
        assert_eq!(Caps::new_any().intersect(&a), a);
        assert_eq!(a.intersect(&Caps::new_any()), a);
        assert!(Caps::new_empty().intersect(&a).is_empty());
        assert!(!Caps::new_any().can_intersect(&Caps::new_empty()));
        assert!(Caps::new_any().can_intersect(&Caps::new_any()));
    }

    #[test]
    fn test_intersect_order_is_commutative() {
        let a = caps("video/x-raw, format=I420; video/x-raw, format=RGB; audio/x-raw");
        let b = caps("audio/x-raw; video/x-raw, format=RGB");
        let ab = a.intersect(&b);
        let ba = b.intersect(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.structures().len(), 2);
    }

    #[test]
    fn test_subset() {
        let fixed = caps("audio/x-raw, rate=44100, channels=1");
        let template = caps("audio/x-raw, rate=[ 8000, 96000 ], channels={ 1, 2 }");
        assert!(fixed.is_subset_of(&template));
        assert!(!template.is_subset_of(&fixed));
        assert!(fixed.is_subset_of(&Caps::new_any()));
        // A missing attribute is unconstrained, so not a subset of a constraint.
        assert!(!caps("audio/x-raw").is_subset_of(&template));
    }

    #[test]
    fn test_fixate_drops_unconstrained() {
        let c = caps("video/x-raw, width=[ 320, 1920 ], format={ I420, RGB }, height=*");
        let fixed = c.fixate();
        assert!(fixed.is_fixed());
        assert_eq!(fixed, caps("video/x-raw, width=320, format=I420"));
        assert!(Caps::new_any().fixate().is_any());
    }

    #[test]
    fn test_structure_from_str() {
        let s: Structure = "audio/x-raw, rate=44100".parse().unwrap();
        assert_eq!(s.get_int("rate"), Some(44100));
        assert!("a/b; c/d".parse::<Structure>().is_err());
    }
}
