//! Caps string parser using winnow.
//!
//! # Syntax
//!
//! - Alternatives are separated by `;`
//! - Each alternative is a media type followed by `, name=value` attributes
//! - Values are integers, fractions (`30/1`), `true`/`false`, bare or quoted
//!   strings, ranges `[ min, max ]`, lists `{ a, b }` or `*` for any value
//! - An optional type prefix such as `(int)` or `(string)` forces the value
//!   type
//! - `ANY` and `EMPTY` denote the special sets

use super::{Caps, CapsValue, Fraction, Structure, Value};
use crate::error::{Error, Result};
use winnow::Parser;
use winnow::ascii::{alpha1, multispace0};
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::error::ContextError;
use winnow::token::take_while;

type WResult<T> = std::result::Result<T, ContextError>;

/// Parse a caps string.
pub(crate) fn parse_caps(input: &str) -> Result<Caps> {
    let trimmed = input.trim();
    match trimmed {
        "" | "EMPTY" => return Ok(Caps::new_empty()),
        "ANY" => return Ok(Caps::new_any()),
        _ => {}
    }
    caps.parse(trimmed)
        .map_err(|e| Error::Parse(format!("invalid caps '{trimmed}': {e}")))
}

/// `n/d` with integer parts.
pub(crate) fn looks_like_fraction(s: &str) -> bool {
    parse_fraction(s).is_some()
}

fn parse_fraction(s: &str) -> Option<Fraction> {
    let (n, d) = s.split_once('/')?;
    if d.is_empty() || !d.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(Fraction::new(n.parse().ok()?, d.parse().ok()?))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn caps(input: &mut &str) -> WResult<Caps> {
    let structures: Vec<Structure> =
        separated(1.., structure, (multispace0, ';', multispace0)).parse_next(input)?;
    // Tolerate a trailing separator.
    let _ = opt((multispace0, ';')).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    Ok(structures.into_iter().collect())
}

fn structure(input: &mut &str) -> WResult<Structure> {
    let name = media_type.parse_next(input)?;
    let fields: Vec<(String, CapsValue)> =
        repeat(0.., preceded((multispace0, ',', multispace0), field)).parse_next(input)?;
    let mut s = Structure::new(name);
    for (k, v) in fields {
        s.set(k, v);
    }
    Ok(s)
}

fn media_type<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '+')
    })
    .parse_next(input)
}

fn field_name<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        alt((alpha1::<_, ContextError>, "_")),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_' || c == '-'),
    )
        .take()
        .parse_next(input)
}

fn type_cast<'a>(input: &mut &'a str) -> WResult<&'a str> {
    let cast = delimited('(', alpha1, ')').parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    Ok(cast)
}

fn field(input: &mut &str) -> WResult<(String, CapsValue)> {
    let name = field_name.parse_next(input)?;
    let _ = (multispace0, '=', multispace0).parse_next(input)?;
    let cast = opt(type_cast).parse_next(input)?;
    let value = field_value(input, cast)?;
    Ok((name.to_string(), value))
}

fn field_value(input: &mut &str, cast: Option<&str>) -> WResult<CapsValue> {
    if input.starts_with('*') {
        let _ = '*'.parse_next(input)?;
        return Ok(CapsValue::Any);
    }
    if input.starts_with('[') {
        return range(input, cast);
    }
    if input.starts_with('{') {
        return list(input, cast);
    }
    scalar(input, cast).map(CapsValue::Fixed)
}

fn range(input: &mut &str, cast: Option<&str>) -> WResult<CapsValue> {
    let _ = ('[', multispace0).parse_next(input)?;
    let min = scalar(input, cast)?;
    let _ = (multispace0, ',', multispace0).parse_next(input)?;
    let max = scalar(input, cast)?;
    let _ = (multispace0, ']').parse_next(input)?;
    CapsValue::range(min, max).ok_or_else(ContextError::new)
}

fn list(input: &mut &str, cast: Option<&str>) -> WResult<CapsValue> {
    let _ = ('{', multispace0).parse_next(input)?;
    let mut values = vec![scalar(input, cast)?];
    loop {
        let _ = multispace0.parse_next(input)?;
        if !input.starts_with(',') {
            break;
        }
        let _ = (',', multispace0).parse_next(input)?;
        values.push(scalar(input, cast)?);
    }
    let _ = '}'.parse_next(input)?;
    CapsValue::list(values).ok_or_else(ContextError::new)
}

fn scalar(input: &mut &str, cast: Option<&str>) -> WResult<Value> {
    if input.starts_with('"') {
        return quoted(input).map(Value::Str);
    }
    let token: &str = take_while(1.., |c: char| {
        !c.is_whitespace() && !matches!(c, ',' | ';' | '=' | '[' | ']' | '{' | '}' | '"')
    })
    .parse_next(input)?;
    classify(token, cast).ok_or_else(ContextError::new)
}

fn classify(token: &str, cast: Option<&str>) -> Option<Value> {
    match cast {
        Some("string" | "str" | "s") => Some(Value::Str(token.to_string())),
        Some("int" | "i") => token.parse().ok().map(Value::Int),
        Some("fraction") => parse_fraction(token).map(Value::Fraction),
        Some("boolean" | "bool" | "b") => parse_bool(token).map(Value::Bool),
        Some(_) => None,
        None => Some(if let Some(b) = parse_bool(token) {
            Value::Bool(b)
        } else if let Ok(i) = token.parse::<i64>() {
            Value::Int(i)
        } else if let Some(f) = parse_fraction(token) {
            Value::Fraction(f)
        } else {
            Value::Str(token.to_string())
        }),
    }
}

/// Double-quoted string with backslash escapes.
fn quoted(input: &mut &str) -> WResult<String> {
    let _ = '"'.parse_next(input)?;
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                *input = &input[i + 1..];
                return Ok(out);
            }
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(ContextError::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let caps = parse_caps("video/x-raw,width=640,height=480").unwrap();
        let s = caps.first().unwrap();
        assert_eq!(s.name(), "video/x-raw");
        assert_eq!(s.get_int("width"), Some(640));
        assert_eq!(s.get_int("height"), Some(480));
        assert!(caps.is_fixed());
    }

    #[test]
    fn test_round_trip() {
        for text in [
            "video/x-raw,width=640,height=480",
            "audio/x-raw,rate=44100,channels=1",
        ] {
            let caps = parse_caps(text).unwrap();
            let printed = caps.to_string();
            assert_eq!(parse_caps(&printed).unwrap(), caps);
            // Printing is canonical, so a second round is stable.
            assert_eq!(parse_caps(&printed).unwrap().to_string(), printed);
        }
        assert_eq!(
            parse_caps("audio/x-raw,rate=44100,channels=1")
                .unwrap()
                .to_string(),
            "audio/x-raw, rate=44100, channels=1"
        );
    }

    #[test]
    fn test_parse_constraints() {
        let caps = parse_caps(
            "video/x-raw, format={ I420, RGB }, width=[ 1, 4096 ], framerate=30/1, interlaced=false, height=*",
        )
        .unwrap();
        let s = caps.first().unwrap();
        assert_eq!(s.get("format"), CapsValue::list(["I420", "RGB"]).as_ref());
        assert_eq!(s.get("width"), CapsValue::range(1, 4096).as_ref());
        assert_eq!(s.get_fraction("framerate"), Some(Fraction::new(30, 1)));
        assert_eq!(s.value("interlaced"), Some(&Value::Bool(false)));
        assert_eq!(s.get("height"), Some(&CapsValue::Any));
        assert!(!caps.is_fixed());
        assert_eq!(parse_caps(&caps.to_string()).unwrap(), caps);
    }

    #[test]
    fn test_parse_alternatives() {
        let caps = parse_caps("audio/x-raw, rate=8000; audio/x-alaw;").unwrap();
        assert_eq!(caps.structures().len(), 2);
        assert_eq!(caps.structures()[1].name(), "audio/x-alaw");
        assert_eq!(caps.to_string(), "audio/x-raw, rate=8000; audio/x-alaw");
    }

    #[test]
    fn test_parse_special_sets() {
        assert!(parse_caps("ANY").unwrap().is_any());
        assert!(parse_caps(" EMPTY ").unwrap().is_empty());
        assert!(parse_caps("").unwrap().is_empty());
        assert_eq!(Caps::new_any().to_string(), "ANY");
        assert_eq!(Caps::new_empty().to_string(), "EMPTY");
    }

    #[test]
    fn test_parse_quoted_and_casts() {
        let caps = parse_caps(r#"text/x-raw, title="hello, \"world\"", id=(string)42, w=(int)7"#)
            .unwrap();
        let s = caps.first().unwrap();
        assert_eq!(s.get_str("title"), Some("hello, \"world\""));
        assert_eq!(s.get_str("id"), Some("42"));
        assert_eq!(s.get_int("w"), Some(7));
        assert_eq!(parse_caps(&caps.to_string()).unwrap(), caps);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_caps("video/x-raw, width=").is_err());
        assert!(parse_caps("video/x-raw, width=[ 10, 1 ]").is_err());
        assert!(parse_caps("video/x-raw, width=(int)abc").is_err());
        assert!(parse_caps("video/x-raw, title=\"unterminated").is_err());
        assert!(parse_caps("video/x-raw width=1").is_err());
        assert!(parse_caps("; video/x-raw").is_err());
        assert!(parse_caps("video/x-raw, format={ }").is_err());
    }
}
