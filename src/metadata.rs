//! The metadata record embedded in package archives.
//!
//! Every package archive may carry a small property file under
//! [`METADATA_ENTRY`]. The pipeline reads a handful of recursion-policy flags
//! from it (see [`keys`]) and passes every other key through to the processing
//! steps untouched.
//!
//! The record uses property-file syntax:
//!
//! ```text
//! # comment
//! pipeline.conditioned = true
//! pipeline.exclude.children: true
//! vendor.payload=opaque\=value
//! ```
//!
//! While the pipeline descends into nested archives, the records of all
//! enclosing archives are exposed to steps through [`Ancestors`], innermost
//! first. Steps can read ancestor records but never modify them.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Name of the entry holding the metadata record.
pub const METADATA_ENTRY: &str = "META-INF/package.inf";

/// Recognized metadata keys.
pub mod keys {
    /// The archive was prepared for processing. Unmarked archives are passed
    /// through untouched unless processing of everything is requested.
    pub const CONDITIONED: &str = "pipeline.conditioned";
    /// Skip this archive entirely.
    pub const EXCLUDE: &str = "pipeline.exclude";
    /// Do not recurse into nested archives of this archive.
    pub const EXCLUDE_CHILDREN: &str = "pipeline.exclude.children";
    /// The sign step leaves this archive alone.
    pub const EXCLUDE_SIGN: &str = "pipeline.exclude.sign";
    /// The sign step leaves every descendant of this archive alone.
    pub const EXCLUDE_CHILDREN_SIGN: &str = "pipeline.exclude.children.sign";
}

/// A parsed metadata record.
///
/// Keys are kept sorted so that serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
}

impl Metadata {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a record from property-file bytes.
    ///
    /// Parsing never fails: malformed lines degrade to keys with empty values,
    /// and invalid UTF-8 is replaced.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut entries = BTreeMap::new();

        let mut logical = String::new();
        for raw_line in text.lines() {
            // continuation lines drop their leading whitespace too
            let line = raw_line.trim_start();

            if logical.is_empty() && (line.is_empty() || line.starts_with(['#', '!'])) {
                continue;
            }

            if ends_with_continuation(line) {
                logical.push_str(&line[..line.len() - 1]);
                continue;
            }

            logical.push_str(line);
            let (key, value) = split_key_value(&logical);
            entries.insert(key, value);
            logical.clear();
        }

        if !logical.is_empty() {
            let (key, value) = split_key_value(&logical);
            entries.insert(key, value);
        }

        Self { entries }
    }

    /// Serializes the record to property-file bytes, one `key=value` per line.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            escape_into(&mut out, key, true);
            out.push('=');
            escape_into(&mut out, value, false);
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Returns the value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns true if the record contains `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns true if `key` holds a boolean `true` (case-insensitive).
    pub fn is_flag_set(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Sets `key` to `value`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the record holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Read-only view of the metadata records of enclosing archives.
///
/// Iteration yields the innermost ancestor (the direct parent) first.
#[derive(Debug, Clone, Copy)]
pub struct Ancestors<'a> {
    // outermost first, as pushed during descent
    stack: &'a [Metadata],
}

impl<'a> Ancestors<'a> {
    /// Wraps a stack of records ordered outermost first.
    pub fn new(stack: &'a [Metadata]) -> Self {
        Self { stack }
    }

    /// A view with no ancestors, as seen by a top-level archive.
    pub fn empty() -> Self {
        Self { stack: &[] }
    }

    /// Returns the record of the direct parent archive.
    pub fn parent(&self) -> Option<&'a Metadata> {
        self.stack.last()
    }

    /// Iterates from the direct parent outwards.
    pub fn iter(&self) -> impl Iterator<Item = &'a Metadata> + use<'a> {
        self.stack.iter().rev()
    }

    /// Returns true if any ancestor sets `key` to `true`.
    pub fn any_flag_set(&self, key: &str) -> bool {
        self.stack.iter().any(|m| m.is_flag_set(key))
    }

    /// Number of enclosing archives.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns true for a top-level archive.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.bytes().rev().take_while(|&b| b == b'\\').count();
    trailing % 2 == 1
}

fn split_key_value(line: &str) -> (String, String) {
    let mut key = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    push_unescaped(&mut key, escaped, &mut chars);
                }
            }
            '=' | ':' => break,
            c if c.is_whitespace() => {
                // whitespace may itself be the separator, or pad one
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if chars.peek().is_some_and(|&c| c == '=' || c == ':') {
                    chars.next();
                }
                break;
            }
            c => key.push(c),
        }
    }

    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }

    let mut value = String::new();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                push_unescaped(&mut value, escaped, &mut chars);
            }
        } else {
            value.push(c);
        }
    }

    (key, value)
}

fn push_unescaped(
    out: &mut String,
    escaped: char,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) {
    match escaped {
        't' => out.push('\t'),
        'n' => out.push('\n'),
        'r' => out.push('\r'),
        'f' => out.push('\u{c}'),
        'u' => {
            let hex: String = chars.by_ref().take(4).collect();
            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                Some(c) => out.push(c),
                None => {
                    out.push('u');
                    out.push_str(&hex);
                }
            }
        }
        other => out.push(other),
    }
}

fn escape_into(out: &mut String, text: &str, is_key: bool) {
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' if is_key || i == 0 => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            c if c.is_control() || (c.is_whitespace() && (is_key || i == 0)) => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
}
