//! Launch-line parser using winnow.
//!
//! Parses pipeline descriptions such as:
//!
//! ```text
//! testsrc num-buffers=10 ! capsfilter caps="video/x-raw, width=640" ! fakesink
//! testsrc ! tee name=t  t. ! queue ! fakesink  t. ! queue ! fakesink
//! filesrc location=/tmp/in.bin ! video/x-raw,width=320 ! fakesink
//! ```
//!
//! # Syntax
//!
//! - Elements are separated by `!`; a node not preceded by `!` starts a
//!   new chain.
//! - Properties are `name=value` after the element kind; `name=` names the
//!   element.
//! - `t.` refers to the element named `t`, `t.src_0` to one of its pads.
//!   References must name an element defined earlier in the line.
//! - A token containing `/` (bare or quoted) is a caps filter.
//! - Values can be quoted strings, numbers, booleans or bare words.

use super::{ElementFactory, ElementId, Pipeline};
use crate::element::PropertyValue;
use crate::error::{Error, Result};
use tracing::debug;
use winnow::Parser;
use winnow::ascii::{alpha1, digit1, multispace0, multispace1};
use winnow::combinator::{alt, delimited, opt, repeat};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

/// A parsed element with its kind and properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedElement {
    /// The element kind (e.g., "testsrc", "fakesink").
    pub factory: String,
    /// Instance name given with `name=`.
    pub name: Option<String>,
    /// Other properties as key-value pairs.
    pub properties: Vec<(String, PropertyValue)>,
}

/// One node of a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNode {
    /// A new element.
    Element(ParsedElement),
    /// A reference to an element defined earlier (`t.` or `t.pad`).
    Reference {
        /// Element name.
        name: String,
        /// Pad name, if given.
        pad: Option<String>,
    },
    /// Inline caps, turned into a `capsfilter`.
    Caps(String),
}

/// A parsed pipeline description.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPipeline {
    /// Chains of linked nodes, in order of appearance.
    pub chains: Vec<Vec<ParsedNode>>,
}

/// Parse a pipeline description string.
///
/// # Example
///
/// ```rust
/// use mediagraph::pipeline::parse_pipeline;
///
/// let pipeline = parse_pipeline("testsrc num-buffers=10 ! identity ! fakesink").unwrap();
/// assert_eq!(pipeline.chains.len(), 1);
/// assert_eq!(pipeline.chains[0].len(), 3);
/// ```
pub fn parse_pipeline(input: &str) -> Result<ParsedPipeline> {
    pipeline
        .parse(input.trim())
        .map_err(|e| Error::Parse(format!("invalid pipeline description: {e}")))
}

/// Build a pipeline from a description, creating elements with `factory`.
pub fn launch(factory: &ElementFactory, description: &str) -> Result<Pipeline> {
    let parsed = parse_pipeline(description)?;
    let mut pipeline = Pipeline::new();
    for chain in &parsed.chains {
        let mut prev: Option<(ElementId, Option<String>)> = None;
        for node in chain {
            let (id, pad) = match node {
                ParsedNode::Element(parsed) => {
                    let element = factory.make(&parsed.factory, parsed.name.as_deref())?;
                    for (key, value) in &parsed.properties {
                        element.set_property(key, value.clone())?;
                    }
                    (pipeline.add(element)?, None)
                }
                ParsedNode::Reference { name, pad } => {
                    let id = pipeline
                        .by_name(name)
                        .ok_or_else(|| Error::ElementNotFound(name.clone()))?;
                    (id, pad.clone())
                }
                ParsedNode::Caps(caps) => {
                    let element = factory.make("capsfilter", None)?;
                    element.set_property("caps", caps.as_str())?;
                    (pipeline.add(element)?, None)
                }
            };
            if let Some((prev_id, prev_pad)) = prev {
                pipeline.link_with_pads(prev_id, prev_pad.as_deref(), id, pad.as_deref())?;
            }
            prev = Some((id, pad));
        }
    }
    debug!(pipeline = %pipeline.name(), elements = pipeline.len(), "launched");
    Ok(pipeline)
}

/// Parse a complete pipeline.
fn pipeline(input: &mut &str) -> WResult<ParsedPipeline> {
    let mut chains = vec![chain.parse_next(input)?];
    loop {
        let checkpoint = *input;
        if multispace1::<_, ContextError>.parse_next(input).is_err() {
            break;
        }
        if input.is_empty() {
            break;
        }
        match chain.parse_next(input) {
            Ok(next) => chains.push(next),
            Err(_) => {
                *input = checkpoint;
                break;
            }
        }
    }

    // Ensure we consumed all input
    multispace0.parse_next(input)?;
    if !input.is_empty() {
        return Err(ContextError::new());
    }

    Ok(ParsedPipeline { chains })
}

/// Parse nodes joined by `!`.
fn chain(input: &mut &str) -> WResult<Vec<ParsedNode>> {
    let mut nodes = vec![node.parse_next(input)?];
    loop {
        let checkpoint = *input;
        if link_separator.parse_next(input).is_err() {
            *input = checkpoint;
            break;
        }
        nodes.push(node.parse_next(input)?);
    }
    Ok(nodes)
}

fn node(input: &mut &str) -> WResult<ParsedNode> {
    alt((
        quoted_string.verify(|s: &String| s.contains('/')).map(ParsedNode::Caps),
        caps_token.map(ParsedNode::Caps),
        reference,
        element.map(ParsedNode::Element),
    ))
    .parse_next(input)
}

/// `media/type,field=value` without spaces.
fn caps_token(input: &mut &str) -> WResult<String> {
    (
        identifier,
        '/',
        take_while(1.., |c: char| !c.is_whitespace() && c != '!'),
    )
        .take()
        .map(str::to_string)
        .parse_next(input)
}

/// `name.` or `name.pad`.
fn reference(input: &mut &str) -> WResult<ParsedNode> {
    let name = identifier.parse_next(input)?;
    let _ = '.'.parse_next(input)?;
    let pad: Option<&str> =
        opt(take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '%')).parse_next(input)?;
    Ok(ParsedNode::Reference {
        name: name.to_string(),
        pad: pad.map(str::to_string),
    })
}

/// Parse an element (kind + optional properties).
fn element(input: &mut &str) -> WResult<ParsedElement> {
    let factory: &str = identifier.parse_next(input)?;
    let properties: Vec<(String, PropertyValue)> = repeat(0.., property).parse_next(input)?;

    let mut name = None;
    let mut rest = Vec::with_capacity(properties.len());
    for (key, value) in properties {
        if key == "name" {
            name = Some(value.as_string());
        } else {
            rest.push((key, value));
        }
    }

    Ok(ParsedElement {
        factory: factory.to_string(),
        name,
        properties: rest,
    })
}

/// Parse the link separator `!`.
fn link_separator(input: &mut &str) -> WResult<()> {
    let _ = multispace0.parse_next(input)?;
    let _ = '!'.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    Ok(())
}

/// Parse an identifier (element kind, element name or property name).
fn identifier<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        alt((alpha1::<_, ContextError>, "_")),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_' || c == '-'),
    )
        .take()
        .parse_next(input)
}

/// Parse a property (key=value), preceded by whitespace.
fn property(input: &mut &str) -> WResult<(String, PropertyValue)> {
    // If this does not look like a property, don't consume anything.
    let checkpoint = *input;
    let result = key_value(input);
    if result.is_err() {
        *input = checkpoint;
    }
    result
}

fn key_value(input: &mut &str) -> WResult<(String, PropertyValue)> {
    let _ = multispace1.parse_next(input)?;
    let key: &str = identifier.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let _ = '='.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let value = property_value.parse_next(input)?;
    Ok((key.to_string(), value))
}

/// Parse a property value.
fn property_value(input: &mut &str) -> WResult<PropertyValue> {
    alt((
        quoted_string.map(PropertyValue::String),
        terminated_word(boolean).map(PropertyValue::Bool),
        terminated_word(float).map(PropertyValue::Float),
        terminated_word(integer).map(PropertyValue::Integer),
        bare_string.map(PropertyValue::String),
    ))
    .parse_next(input)
}

/// Accept `parser` only if the value ends there, so that `10x` or
/// `true-ish` fall through to a bare string.
fn terminated_word<'a, O>(
    mut parser: impl Parser<&'a str, O, ContextError>,
) -> impl Parser<&'a str, O, ContextError> {
    move |input: &mut &'a str| {
        let checkpoint = *input;
        let value = parser.parse_next(input)?;
        match input.chars().next() {
            None => Ok(value),
            Some(c) if c.is_whitespace() || c == '!' => Ok(value),
            Some(_) => {
                *input = checkpoint;
                Err(ContextError::new())
            }
        }
    }
}

/// Parse a quoted string.
fn quoted_string(input: &mut &str) -> WResult<String> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

/// Parse a boolean.
fn boolean(input: &mut &str) -> WResult<bool> {
    alt((
        "true".map(|_| true),
        "false".map(|_| false),
        "yes".map(|_| true),
        "no".map(|_| false),
    ))
    .parse_next(input)
}

/// Parse an integer.
fn integer(input: &mut &str) -> WResult<i64> {
    let negative = opt('-').parse_next(input)?;
    let digits: &str = digit1.parse_next(input)?;

    // Make sure this isn't a float (no decimal point follows)
    if input.starts_with('.') {
        return Err(ContextError::new());
    }

    let value: i64 = digits.parse().map_err(|_| ContextError::new())?;

    Ok(if negative.is_some() { -value } else { value })
}

/// Parse a float.
fn float(input: &mut &str) -> WResult<f64> {
    let negative = opt('-').parse_next(input)?;
    let int_part: &str = digit1.parse_next(input)?;
    let _ = '.'.parse_next(input)?;
    let frac_part: &str = digit1.parse_next(input)?;

    let s = format!(
        "{}{}.{}",
        if negative.is_some() { "-" } else { "" },
        int_part,
        frac_part
    );
    s.parse().map_err(|_| ContextError::new())
}

/// Parse a bare (unquoted) string value. Stops at whitespace or `!`;
/// `=` is allowed so that caps like `video/x-raw,width=640` need no quotes.
fn bare_string(input: &mut &str) -> WResult<String> {
    take_while(1.., |c: char| !c.is_whitespace() && c != '!')
        .map(|s: &str| s.to_string())
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_chain(input: &str) -> Vec<ParsedNode> {
        let mut parsed = parse_pipeline(input).unwrap();
        assert_eq!(parsed.chains.len(), 1);
        parsed.chains.remove(0)
    }

    fn element_at(nodes: &[ParsedNode], i: usize) -> &ParsedElement {
        match &nodes[i] {
            ParsedNode::Element(e) => e,
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_simple_element() {
        let nodes = single_chain("fakesink");
        assert_eq!(element_at(&nodes, 0).factory, "fakesink");
        assert!(element_at(&nodes, 0).properties.is_empty());
    }

    #[test]
    fn test_parse_element_with_properties() {
        let nodes = single_chain("testsrc num-buffers=100 name=src is-live=true");
        let src = element_at(&nodes, 0);
        assert_eq!(src.name.as_deref(), Some("src"));
        assert_eq!(
            src.properties,
            vec![
                ("num-buffers".to_string(), PropertyValue::Integer(100)),
                ("is-live".to_string(), PropertyValue::Bool(true)),
            ]
        );
    }

    #[test]
    fn test_parse_pipeline_chain() {
        let nodes = single_chain("testsrc ! identity ! fakesink");
        assert_eq!(nodes.len(), 3);
        assert_eq!(element_at(&nodes, 2).factory, "fakesink");
    }

    #[test]
    fn test_parse_value_types() {
        let nodes = single_chain(
            r#"x a="/path with spaces/f.bin" b='/p' c=1.5 d=-100 e=10x f=/tmp/in.bin"#,
        );
        let props = &element_at(&nodes, 0).properties;
        assert_eq!(props[0].1, PropertyValue::String("/path with spaces/f.bin".into()));
        assert_eq!(props[1].1, PropertyValue::String("/p".into()));
        assert_eq!(props[2].1, PropertyValue::Float(1.5));
        assert_eq!(props[3].1, PropertyValue::Integer(-100));
        assert_eq!(props[4].1, PropertyValue::String("10x".into()));
        assert_eq!(props[5].1, PropertyValue::String("/tmp/in.bin".into()));
    }

    #[test]
    fn test_parse_caps_nodes() {
        let nodes = single_chain(r#"testsrc ! video/x-raw,width=320 ! "audio/x-raw, rate=48000" ! fakesink"#);
        assert_eq!(nodes[1], ParsedNode::Caps("video/x-raw,width=320".into()));
        assert_eq!(nodes[2], ParsedNode::Caps("audio/x-raw, rate=48000".into()));
    }

    #[test]
    fn test_parse_caps_property_unquoted() {
        let nodes = single_chain("capsfilter caps=video/x-raw,width=640 ! fakesink");
        assert_eq!(
            element_at(&nodes, 0).properties[0].1,
            PropertyValue::String("video/x-raw,width=640".into())
        );
    }

    #[test]
    fn test_parse_branches() {
        let parsed = parse_pipeline("testsrc ! tee name=t  t. ! queue ! fakesink  t.src_1 ! fakesink").unwrap();
        assert_eq!(parsed.chains.len(), 3);
        assert_eq!(
            parsed.chains[1][0],
            ParsedNode::Reference {
                name: "t".into(),
                pad: None
            }
        );
        assert_eq!(
            parsed.chains[2][0],
            ParsedNode::Reference {
                name: "t".into(),
                pad: Some("src_1".into())
            }
        );
    }

    #[test]
    fn test_parse_no_spaces() {
        let nodes = single_chain("a!b!c");
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_pipeline(""), Err(Error::Parse(_))));
        assert!(parse_pipeline("!").is_err());
        assert!(parse_pipeline("a ! ").is_err());
        assert!(parse_pipeline("a = b").is_err());
    }
}
