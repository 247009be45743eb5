//! Generic attribute entry as stored by the entry repository.

use crate::model::dn::Dn;
use std::collections::BTreeMap;

/// Multi-valued attribute map. Value order is insertion order.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// One DN-addressed entry with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub dn: Dn,
    pub attributes: Attributes,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: Attributes::new(),
        }
    }

    /// All values of `attr`; empty when the attribute is absent.
    pub fn values(&self, attr: &str) -> &[String] {
        self.attributes
            .get(attr)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First value of `attr`.
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.values(attr).first().map(String::as_str)
    }

    /// Exactly one value of `attr`; `Err` names the attribute when the
    /// value is missing or repeated.
    pub fn single(&self, attr: &str) -> Result<&str, String> {
        match self.values(attr) {
            [value] => Ok(value.as_str()),
            [] => Err(format!("missing `{attr}` on {}", self.dn)),
            values => Err(format!(
                "expected one `{attr}` on {}, found {}",
                self.dn,
                values.len()
            )),
        }
    }

    /// Exactly one value of `attr`, parsed as a POSIX id.
    pub fn single_id(&self, attr: &str) -> Result<u32, String> {
        let value = self.single(attr)?;
        value
            .parse::<u32>()
            .map_err(|_| format!("invalid `{attr}` value `{value}` on {}", self.dn))
    }

    /// Values of `attr` parsed as DNs.
    pub fn dn_values(&self, attr: &str) -> Result<Vec<Dn>, String> {
        self.values(attr)
            .iter()
            .map(|value| {
                Dn::parse(value)
                    .map_err(|err| format!("invalid `{attr}` dn `{value}` on {}: {err}", self.dn))
            })
            .collect()
    }

    /// Builder-style helper for single-valued attributes.
    pub fn with(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(attr.into())
            .or_default()
            .push(value.into());
        self
    }
}
