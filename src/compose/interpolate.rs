//! Variable interpolation over compose file values
//!
//! Only string scalars are expanded, after the YAML is parsed, so a value
//! containing `: ` or `*` cannot change the document's structure.
//!
//! Supports `$VAR`, `${VAR}`, `${VAR:-default}`, `${VAR-default}` and `$$`.
//! The `:?` and `?` forms are accepted and treated like a plain `${VAR}`.
//! Unknown variables expand to an empty string.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::char,
    combinator::{map, opt, value},
    sequence::{pair, preceded},
    IResult, Parser,
};
use serde_yaml::Value;

/// Keys whose expanded value is retyped from text to a number or bool
const TYPED_KEYS: &[&str] = &["replicas", "external"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback<'a> {
    /// `:-`: used when unset or empty
    UnsetOrEmpty(&'a str),
    /// `-`: used when unset
    Unset(&'a str),
    /// `:?` / `?`
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    Dollar,
    Var {
        name: &'a str,
        fallback: Option<Fallback<'a>>,
    },
}

/// Expand variables in `text` using `lookup`
pub fn interpolate(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut input = text;

    while !input.is_empty() {
        match token(input) {
            Ok((remaining, token)) => {
                render(&mut out, token, &lookup);
                input = remaining;
            }
            Err(_) => {
                // A `$` that starts nothing we know is kept as is
                out.push('$');
                input = &input[1..];
            }
        }
    }

    out
}

/// Expand variables in every string scalar of a parsed document
///
/// Mapping keys are left alone. A changed value under `replicas` or
/// `external` is retyped when it reads as a number or bool.
pub fn interpolate_value(value: Value, lookup: &impl Fn(&str) -> Option<String>) -> Value {
    expand_value(value, None, lookup)
}

fn expand_value(value: Value, key: Option<&str>, lookup: &impl Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(text) => {
            let expanded = interpolate(&text, lookup);
            if expanded != text && key.is_some_and(|k| TYPED_KEYS.contains(&k)) {
                retype(expanded)
            } else {
                Value::String(expanded)
            }
        }
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| expand_value(item, None, lookup))
                .collect(),
        ),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let v = expand_value(v, k.as_str(), lookup);
                    (k, v)
                })
                .collect(),
        ),
        Value::Tagged(mut tagged) => {
            tagged.value = expand_value(std::mem::take(&mut tagged.value), key, lookup);
            Value::Tagged(tagged)
        }
        other => other,
    }
}

fn retype(text: String) -> Value {
    match serde_yaml::from_str::<Value>(&text) {
        Ok(typed @ (Value::Number(_) | Value::Bool(_))) => typed,
        _ => Value::String(text),
    }
}

fn render(out: &mut String, token: Token<'_>, lookup: &impl Fn(&str) -> Option<String>) {
    match token {
        Token::Literal(s) => out.push_str(s),
        Token::Dollar => out.push('$'),
        Token::Var { name, fallback } => {
            let found = lookup(name);
            let expanded = match (found, fallback) {
                (Some(v), Some(Fallback::UnsetOrEmpty(d))) if v.is_empty() => d.to_string(),
                (Some(v), _) => v,
                (None, Some(Fallback::UnsetOrEmpty(d) | Fallback::Unset(d))) => d.to_string(),
                (None, _) => String::new(),
            };
            out.push_str(&expanded);
        }
    }
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(take_while1(|c: char| c != '$'), Token::Literal),
        value(Token::Dollar, tag("$$")),
        braced,
        map(preceded(char('$'), var_name), |name| Token::Var {
            name,
            fallback: None,
        }),
    ))
    .parse(input)
}

fn var_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_').parse(input)
}

fn braced(input: &str) -> IResult<&str, Token<'_>> {
    let (input, _) = tag("${").parse(input)?;
    let (input, name) = var_name(input)?;
    let (input, fallback) = opt(alt((
        map(preceded(tag(":-"), take_till(|c| c == '}')), Fallback::UnsetOrEmpty),
        map(preceded(char('-'), take_till(|c| c == '}')), Fallback::Unset),
        value(
            Fallback::Required,
            pair(alt((tag(":?"), tag("?"))), take_till(|c| c == '}')),
        ),
    )))
    .parse(input)?;
    let (input, _) = char('}').parse(input)?;

    Ok((input, Token::Var { name, fallback }))
}
