//! `.env` file parsing
//!
//! Accepts `KEY=VALUE` lines with an optional `export` prefix, `#`
//! comments, single quoted (literal) and double quoted (escaped) values,
//! and inline comments after unquoted values.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{anychar, char, space0, space1},
    combinator::{eof, map, opt, rest, verify},
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Variables read from a `.env` file
pub type EnvMap = HashMap<String, String>;

/// Parse `.env` content, skipping malformed lines
pub fn parse(content: &str) -> EnvMap {
    let mut vars = EnvMap::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match entry(line) {
            Ok((_, (key, value))) => {
                vars.insert(key.to_string(), value);
            }
            Err(_) => warn!(line = index + 1, "Skipping malformed .env line"),
        }
    }

    vars
}

/// Read a `.env` file; a missing or unreadable file yields no variables
pub fn load(path: &Path) -> EnvMap {
    match std::fs::read_to_string(path) {
        Ok(content) => parse(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(file = %path.display(), "No .env file");
            EnvMap::new()
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Failed to read .env file, proceeding without it");
            EnvMap::new()
        }
    }
}

fn entry(input: &str) -> IResult<&str, (&str, String)> {
    let (input, _) = opt(pair(tag("export"), space1)).parse(input)?;
    let (input, key) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.').parse(input)?;
    let (input, _) = delimited(space0, char('='), space0).parse(input)?;
    let (input, value) = alt((
        double_quoted,
        map(single_quoted, str::to_string),
        map(verify(rest, |v: &str| !v.starts_with(['"', '\''])), unquoted),
    ))
    .parse(input)?;
    let (input, _) = pair(space0, opt(preceded(char('#'), rest))).parse(input)?;
    let (input, _) = eof.parse(input)?;

    Ok((input, (key, value)))
}

fn single_quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('\''), take_till(|c| c == '\''), char('\'')).parse(input)
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    let (mut input, _) = char('"').parse(input)?;
    let mut value = String::new();

    loop {
        let (remaining, chunk) = take_till(|c| c == '"' || c == '\\').parse(input)?;
        value.push_str(chunk);

        let (remaining, ch) = anychar.parse(remaining)?;
        if ch == '"' {
            return Ok((remaining, value));
        }

        let (remaining, escaped) = anychar.parse(remaining)?;
        value.push(match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            other => other,
        });
        input = remaining;
    }
}

fn unquoted(raw: &str) -> String {
    let value = match raw.find(" #") {
        Some(at) => &raw[..at],
        None => raw,
    };
    value.trim().to_string()
}
