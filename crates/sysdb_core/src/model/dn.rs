//! Distinguished names for the hierarchical entry store.
//!
//! # Responsibility
//! - Represent an entry address as an ordered list of RDNs, leaf first.
//! - Render canonical, escaped DN strings and parse them back.
//!
//! # Invariants
//! - `Display` output is canonical: `Dn::parse(&dn.to_string()) == Ok(dn)`.
//! - RDN values are escaped so that no value can introduce an extra RDN or
//!   change the parent of the address it is part of.
//! - Attribute names match `[A-Za-z][A-Za-z0-9-]*`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::iter::Peekable;
use std::str::Chars;

/// Characters that must always be escaped inside an RDN value.
const SPECIAL_CHARS: &[char] = &[',', '+', '"', '\\', '<', '>', ';', '='];

/// DN construction and parsing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnError {
    /// Input string is empty or blank.
    Empty,
    /// Attribute name is empty or contains unsupported characters.
    InvalidAttribute(String),
    /// An RDN has no `=` separator.
    MissingEquals(String),
    /// An RDN value is empty.
    EmptyValue(String),
    /// A backslash escape is truncated or not a valid escape sequence.
    InvalidEscape(String),
    /// A reserved character appears unescaped inside a value.
    UnescapedCharacter { input: String, character: char },
    /// Escaped hex pairs do not decode to UTF-8.
    InvalidUtf8(String),
}

impl Display for DnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "dn must not be empty"),
            Self::InvalidAttribute(attr) => write!(f, "invalid dn attribute name `{attr}`"),
            Self::MissingEquals(input) => write!(f, "rdn without `=` in `{input}`"),
            Self::EmptyValue(input) => write!(f, "empty rdn value in `{input}`"),
            Self::InvalidEscape(input) => write!(f, "invalid escape sequence in `{input}`"),
            Self::UnescapedCharacter { input, character } => {
                write!(f, "unescaped `{character}` in `{input}`")
            }
            Self::InvalidUtf8(input) => write!(f, "escaped value is not utf-8 in `{input}`"),
        }
    }
}

impl Error for DnError {}

/// One `attr=value` component of a DN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rdn {
    attr: String,
    value: String,
}

impl Rdn {
    /// Creates an RDN after validating attribute name and value.
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Result<Self, DnError> {
        let attr = attr.into();
        let value = value.into();
        if !is_valid_attribute_name(&attr) {
            return Err(DnError::InvalidAttribute(attr));
        }
        if value.is_empty() {
            return Err(DnError::EmptyValue(attr));
        }
        Ok(Self { attr, value })
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Unescaped value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Display for Rdn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.attr, escape_value(&self.value))
    }
}

/// Hierarchical entry address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// Creates a single-RDN (top level) DN.
    pub fn top(attr: impl Into<String>, value: impl Into<String>) -> Result<Self, DnError> {
        Ok(Self {
            rdns: vec![Rdn::new(attr, value)?],
        })
    }

    /// Returns a new DN one level below `self`.
    pub fn child(&self, attr: impl Into<String>, value: impl Into<String>) -> Result<Self, DnError> {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(Rdn::new(attr, value)?);
        rdns.extend(self.rdns.iter().cloned());
        Ok(Self { rdns })
    }

    /// Parses a DN string, reversing the escaping applied by `Display`.
    pub fn parse(input: &str) -> Result<Self, DnError> {
        if input.trim().is_empty() {
            return Err(DnError::Empty);
        }

        let mut chars = input.chars().peekable();
        let mut rdns = Vec::new();
        loop {
            let attr = read_attribute(&mut chars, input)?;
            let (value, more) = read_value(&mut chars, input)?;
            rdns.push(Rdn { attr, value });
            if !more {
                break;
            }
        }
        Ok(Self { rdns })
    }

    /// Leaf RDN.
    pub fn rdn(&self) -> &Rdn {
        &self.rdns[0]
    }

    /// RDNs from leaf to root.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Number of RDNs; a top-level DN has depth 1.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Parent DN, or `None` for a top-level DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.len() < 2 {
            return None;
        }
        Some(Self {
            rdns: self.rdns[1..].to_vec(),
        })
    }
}

impl Display for Dn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, rdn) in self.rdns.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl Serialize for Dn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Dn::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Whether `name` is usable as an attribute name in DNs and entries.
pub fn is_valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        _ => false,
    }
}

/// Escapes one RDN value.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last_index = value.chars().count().saturating_sub(1);
    for (index, c) in value.chars().enumerate() {
        match c {
            '\0' => escaped.push_str("\\00"),
            c if SPECIAL_CHARS.contains(&c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            '#' if index == 0 => escaped.push_str("\\#"),
            ' ' if index == 0 || index == last_index => escaped.push_str("\\ "),
            c => escaped.push(c),
        }
    }
    escaped
}

fn read_attribute(chars: &mut Peekable<Chars<'_>>, input: &str) -> Result<String, DnError> {
    let mut attr = String::new();
    loop {
        match chars.next() {
            Some('=') => break,
            Some(',') | None => return Err(DnError::MissingEquals(input.to_string())),
            Some(c) => attr.push(c),
        }
    }
    if !is_valid_attribute_name(&attr) {
        return Err(DnError::InvalidAttribute(attr));
    }
    Ok(attr)
}

/// Reads one value; the flag reports whether another RDN follows.
fn read_value(chars: &mut Peekable<Chars<'_>>, input: &str) -> Result<(String, bool), DnError> {
    let mut bytes: Vec<u8> = Vec::new();
    let mut trailing_unescaped_space = false;
    let mut more = false;
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        match c {
            ',' => {
                more = true;
                break;
            }
            '\\' => {
                trailing_unescaped_space = false;
                match chars.next() {
                    Some(e) if SPECIAL_CHARS.contains(&e) || e == ' ' || e == '#' => {
                        bytes.extend_from_slice(e.encode_utf8(&mut buf).as_bytes());
                    }
                    Some(high) if high.is_ascii_hexdigit() => {
                        let low = chars
                            .next()
                            .filter(char::is_ascii_hexdigit)
                            .ok_or_else(|| DnError::InvalidEscape(input.to_string()))?;
                        let pair = format!("{high}{low}");
                        let byte = u8::from_str_radix(&pair, 16)
                            .map_err(|_| DnError::InvalidEscape(input.to_string()))?;
                        bytes.push(byte);
                    }
                    _ => return Err(DnError::InvalidEscape(input.to_string())),
                }
            }
            c if SPECIAL_CHARS.contains(&c) || (bytes.is_empty() && (c == '#' || c == ' ')) => {
                return Err(DnError::UnescapedCharacter {
                    input: input.to_string(),
                    character: c,
                });
            }
            c => {
                trailing_unescaped_space = c == ' ';
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    if trailing_unescaped_space {
        return Err(DnError::UnescapedCharacter {
            input: input.to_string(),
            character: ' ',
        });
    }
    if bytes.is_empty() {
        return Err(DnError::EmptyValue(input.to_string()));
    }
    if more && chars.peek().is_none() {
        return Err(DnError::MissingEquals(input.to_string()));
    }

    let value = String::from_utf8(bytes).map_err(|_| DnError::InvalidUtf8(input.to_string()))?;
    Ok((value, more))
}
