//! Key/value property bags and the line-oriented file format they load from.
//!
//! ```text
//! # comment
//! Driver = sqlite
//! Url: jdbc:sqlite:app.db
//! Password=multi\
//!          line
//! ```
use crate::core::{DjapiError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// An ordered bag of string properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Properties::default()
    }

    /// Reads and parses the properties file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Properties::parse(&content)
    }

    /// Parses properties from text.
    ///
    /// Later duplicates of a key replace earlier ones.
    ///
    /// # Errors
    ///
    /// Returns `DjapiError::Config` for a malformed `\uXXXX` escape.
    pub fn parse(content: &str) -> Result<Self> {
        let mut properties = Properties::new();
        for (line_no, line) in logical_lines(content) {
            let (key, value) = split_entry(&line);
            let key = unescape(key).map_err(|e| config_error(line_no, e))?;
            let value = unescape(value).map_err(|e| config_error(line_no, e))?;
            properties.entries.insert(key, value);
        }
        Ok(properties)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Sets `key` to `value`, returning the previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Properties {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn config_error(line_no: usize, message: String) -> DjapiError {
    DjapiError::Config(format!("line {}: {}", line_no, message))
}

/// Joins continuation lines and drops blanks and comments.
///
/// Yields the 1-based number of the first physical line with each logical line.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, raw) in content.lines().enumerate() {
        let trimmed = raw.trim_start();
        let continued = ends_with_continuation(trimmed);
        let body = if continued {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };

        match pending.as_mut() {
            Some((_, buf)) => buf.push_str(body),
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                pending = Some((index + 1, body.to_string()));
            }
        }

        if !continued {
            lines.extend(pending.take());
        }
    }
    lines.extend(pending);
    lines
}

/// An odd number of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Splits a logical line into its raw (still escaped) key and value
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let rest = line[key_end..].trim_start_matches([' ', '\t', '\x0c']);
    let rest = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest);
    (key, rest.trim_start_matches([' ', '\t', '\x0c']))
}

fn unescape(raw: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let well_formed =
                    hex.chars().count() == 4 && hex.chars().all(|c| c.is_ascii_hexdigit());
                let decoded = well_formed
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("malformed \\u escape: \\u{}", hex))?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}
