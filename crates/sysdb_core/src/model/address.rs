//! Sysdb entry addressing.
//!
//! # Responsibility
//! - Map (domain, kind, name) to the canonical entry DN.
//! - Map (domain, kind) to the container DN used to scope searches.
//! - Check that stored links point at entries of the expected kind and domain.
//!
//! # Invariants
//! - Layout: `name=<key>,cn=<users|groups>,cn=<domain>,cn=sysdb`.
//! - Two domains never share a container, so equal names cannot collide.
//! - Empty domains or names are rejected before any DN is built.

use crate::model::attrs;
use crate::model::dn::{Dn, DnError};
use crate::model::entry::Entry;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Value of the top-level `cn` RDN.
pub const SYSDB_ROOT: &str = "sysdb";

/// Entry kind stored below a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// POSIX user.
    Account,
    /// POSIX group.
    Group,
}

impl EntryKind {
    /// Container RDN value for this kind.
    pub fn container(self) -> &'static str {
        match self {
            Self::Account => "users",
            Self::Group => "groups",
        }
    }

    /// `objectClass` value carried by entries of this kind.
    pub fn object_class(self) -> &'static str {
        match self {
            Self::Account => attrs::USER_CLASS,
            Self::Group => attrs::GROUP_CLASS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Group => "group",
        }
    }
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type AddressResult<T> = Result<T, AddressError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    EmptyDomain,
    EmptyName(EntryKind),
    Dn(DnError),
}

impl Display for AddressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDomain => write!(f, "domain name must not be empty"),
            Self::EmptyName(kind) => write!(f, "{kind} name must not be empty"),
            Self::Dn(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AddressError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Dn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DnError> for AddressError {
    fn from(value: DnError) -> Self {
        Self::Dn(value)
    }
}

/// `cn=sysdb`
pub fn root_dn() -> Dn {
    Dn::top(attrs::CN, SYSDB_ROOT).expect("static root rdn is valid")
}

/// `cn=<domain>,cn=sysdb`
pub fn domain_dn(domain: &str) -> AddressResult<Dn> {
    if domain.trim().is_empty() {
        return Err(AddressError::EmptyDomain);
    }
    Ok(root_dn().child(attrs::CN, domain)?)
}

/// Container holding every entry of `kind` in `domain`.
pub fn container_dn(domain: &str, kind: EntryKind) -> AddressResult<Dn> {
    Ok(domain_dn(domain)?.child(attrs::CN, kind.container())?)
}

/// Canonical address of one account or group.
pub fn entry_dn(domain: &str, kind: EntryKind, name: &str) -> AddressResult<Dn> {
    if domain.trim().is_empty() {
        return Err(AddressError::EmptyDomain);
    }
    if name.trim().is_empty() {
        return Err(AddressError::EmptyName(kind));
    }
    Ok(container_dn(domain, kind)?.child(attrs::NAME, name)?)
}

/// Decoded form of an entry DN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAddress {
    pub domain: String,
    pub kind: EntryKind,
    pub name: String,
}

/// Inverse of [`entry_dn`]; `None` when `dn` is not an account or group address.
pub fn decode_entry_dn(dn: &Dn) -> Option<EntryAddress> {
    let rdns = dn.rdns();
    if rdns.len() != 4 {
        return None;
    }
    let (leaf, container, domain, root) = (&rdns[0], &rdns[1], &rdns[2], &rdns[3]);
    if leaf.attr() != attrs::NAME
        || container.attr() != attrs::CN
        || domain.attr() != attrs::CN
        || root.attr() != attrs::CN
        || root.value() != SYSDB_ROOT
    {
        return None;
    }
    let kind = match container.value() {
        "users" => EntryKind::Account,
        "groups" => EntryKind::Group,
        _ => return None,
    };
    Some(EntryAddress {
        domain: domain.value().to_string(),
        kind,
        name: leaf.value().to_string(),
    })
}

/// DN values of `attr` on `entry`; every one must address a `kind` entry of `domain`.
pub fn linked_entries(
    entry: &Entry,
    attr: &str,
    domain: &str,
    kind: EntryKind,
) -> Result<Vec<Dn>, String> {
    let dns = entry.dn_values(attr)?;
    for dn in &dns {
        match decode_entry_dn(dn) {
            Some(address) if address.kind == kind && address.domain == domain => {}
            _ => {
                return Err(format!(
                    "`{attr}` value {dn} on {} is not a {kind} of domain `{domain}`",
                    entry.dn
                ))
            }
        }
    }
    Ok(dns)
}
