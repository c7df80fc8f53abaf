//! Attribute values and constraints.

use std::cmp::Ordering;
use std::fmt;

/// A rational number such as a framerate (`30/1`, `30000/1001`).
///
/// Equality and ordering compare the numeric value, so `60/2 == 30/1`.
#[derive(Clone, Copy, Debug)]
pub struct Fraction {
    num: i64,
    den: i64,
}

impl Fraction {
    /// Create a fraction. A zero denominator is replaced by one, and the sign
    /// is carried by the numerator.
    pub fn new(num: i64, den: i64) -> Self {
        match den.cmp(&0) {
            Ordering::Equal => Self { num, den: 1 },
            Ordering::Less => Self {
                num: -num,
                den: -den,
            },
            Ordering::Greater => Self { num, den },
        }
    }

    /// Numerator.
    pub fn numer(&self) -> i64 {
        self.num
    }

    /// Denominator (always positive).
    pub fn denom(&self) -> i64 {
        self.den
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fraction {}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as i128 * other.den as i128).cmp(&(other.num as i128 * self.den as i128))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A single attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Integer.
    Int(i64),
    /// Fraction.
    Fraction(Fraction),
    /// Boolean.
    Bool(bool),
    /// String.
    Str(String),
}

impl Value {
    /// Short type name, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Fraction(_) => "fraction",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
        }
    }

    /// The integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The fraction, if this is one.
    pub fn as_fraction(&self) -> Option<Fraction> {
        match self {
            Value::Fraction(f) => Some(*f),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether a value of this kind can be the bound of a range.
    pub(crate) fn is_orderable(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Fraction(_))
    }

    fn needs_quotes(s: &str) -> bool {
        s.is_empty()
            || matches!(s, "true" | "false")
            || s.parse::<i64>().is_ok()
            || super::parse::looks_like_fraction(s)
            || !s
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '+' | ':'))
    }
}

/// Values of different kinds are unordered.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Fraction(a), Value::Fraction(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Fraction(fr) => write!(f, "{fr}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) if Value::needs_quotes(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Fraction> for Value {
    fn from(v: Fraction) -> Self {
        Value::Fraction(v)
    }
}

/// Constraint on one attribute.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum CapsValue {
    /// Exactly this value.
    Fixed(Value),
    /// Inclusive range over integers or fractions.
    Range {
        /// Lower bound.
        min: Value,
        /// Upper bound.
        max: Value,
    },
    /// One of these values, most preferred first. Never empty.
    List(Vec<Value>),
    /// Unconstrained.
    #[default]
    Any,
}

impl CapsValue {
    /// A range constraint. Returns `None` if the bounds are of different or
    /// unorderable kinds, or `min > max`.
    pub fn range(min: impl Into<Value>, max: impl Into<Value>) -> Option<Self> {
        let (min, max) = (min.into(), max.into());
        if !min.is_orderable() {
            return None;
        }
        match min.partial_cmp(&max)? {
            Ordering::Greater => None,
            Ordering::Equal => Some(Self::Fixed(min)),
            Ordering::Less => Some(Self::Range { min, max }),
        }
    }

    /// A list constraint. Single-entry lists collapse to a fixed value.
    /// Returns `None` for an empty list, which no value satisfies.
    pub fn list<I, V>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::from_values(values.into_iter().map(Into::into).collect())
    }

    fn from_values(mut values: Vec<Value>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(Self::Fixed),
            _ => Some(Self::List(values)),
        }
    }

    /// Whether `value` satisfies this constraint.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Fixed(v) => v == value,
            Self::Range { min, max } => in_range(value, min, max),
            Self::List(values) => values.contains(value),
            Self::Any => true,
        }
    }

    /// Whether this is a single concrete value.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    /// Values common to both constraints, or `None` if they are disjoint.
    ///
    /// The result does not depend on argument order: list-against-list
    /// intersections rank common values by their combined preference in
    /// both lists.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, v) | (v, Self::Any) => Some(v.clone()),
            (Self::Fixed(v), c) | (c, Self::Fixed(v)) => {
                c.accepts(v).then(|| Self::Fixed(v.clone()))
            }
            (
                Self::Range {
                    min: min1,
                    max: max1,
                },
                Self::Range {
                    min: min2,
                    max: max2,
                },
            ) => {
                let lo = if min1.partial_cmp(min2)? == Ordering::Less {
                    min2
                } else {
                    min1
                };
                let hi = if max1.partial_cmp(max2)? == Ordering::Greater {
                    max2
                } else {
                    max1
                };
                Self::range(lo.clone(), hi.clone())
            }
            (Self::Range { min, max }, Self::List(list))
            | (Self::List(list), Self::Range { min, max }) => Self::from_values(
                list.iter()
                    .filter(|v| in_range(v, min, max))
                    .cloned()
                    .collect(),
            ),
            (Self::List(a), Self::List(b)) => {
                let mut common: Vec<((usize, usize), String, &Value)> = a
                    .iter()
                    .enumerate()
                    .filter_map(|(pa, v)| {
                        let pb = b.iter().position(|w| w == v)?;
                        Some(((pa.min(pb), pa.max(pb)), v.to_string(), v))
                    })
                    .collect();
                common.sort_by(|x, y| x.0.cmp(&y.0).then_with(|| x.1.cmp(&y.1)));
                Self::from_values(common.into_iter().map(|(_, _, v)| v.clone()).collect())
            }
        }
    }

    /// Whether every value accepted by `self` is accepted by `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        match (self, other) {
            (_, Self::Any) => true,
            (Self::Any, _) => false,
            (Self::Fixed(v), o) => o.accepts(v),
            (Self::List(values), o) => values.iter().all(|v| o.accepts(v)),
            (Self::Range { min, max }, Self::Range { min: lo, max: hi }) => {
                in_range(min, lo, hi) && in_range(max, lo, hi)
            }
            (Self::Range { .. }, _) => false,
        }
    }

    /// Pick one value: the range minimum or the first list entry.
    /// `Any` has no natural choice and yields `None`.
    pub fn fixate(&self) -> Option<Value> {
        match self {
            Self::Fixed(v) => Some(v.clone()),
            Self::Range { min, .. } => Some(min.clone()),
            Self::List(values) => values.first().cloned(),
            Self::Any => None,
        }
    }
}

fn in_range(value: &Value, min: &Value, max: &Value) -> bool {
    matches!(
        value.partial_cmp(min),
        Some(Ordering::Greater | Ordering::Equal)
    ) && matches!(value.partial_cmp(max), Some(Ordering::Less | Ordering::Equal))
}

macro_rules! fixed_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for CapsValue {
                fn from(v: $t) -> Self {
                    CapsValue::Fixed(v.into())
                }
            }
        )*
    };
}

fixed_from!(i64, i32, bool, &str, String, Fraction);

impl From<Value> for CapsValue {
    fn from(v: Value) -> Self {
        CapsValue::Fixed(v)
    }
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsValue::Fixed(v) => write!(f, "{v}"),
            CapsValue::Range { min, max } => write!(f, "[ {min}, {max} ]"),
            CapsValue::List(values) => {
                f.write_str("{ ")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(" }")
            }
            CapsValue::Any => f.write_str("*"),
        }
    }
}
