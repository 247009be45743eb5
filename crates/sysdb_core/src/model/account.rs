//! POSIX account model.
//!
//! # Responsibility
//! - Describe the attribute set a caller stores for one account.
//! - Provide the read model returned by account lookups.
//!
//! # Invariants
//! - `member_of` is never written through `PosixAccountAttrs`; only the
//!   membership linker changes it.
//! - Optional attributes that are `None` are absent from the entry.

use crate::model::address::{linked_entries, EntryKind};
use crate::model::attrs;
use crate::model::dn::Dn;
use crate::model::entry::{Attributes, Entry};
use crate::model::validation::{validate_id, validate_name, EntryValidationError, PosixId};
use serde::{Deserialize, Serialize};

/// Full scalar attribute set of one account, as supplied to `store_account`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixAccountAttrs {
    /// Login name; the natural key inside a domain.
    pub name: String,
    /// Credential placeholder. Stored as given, never verified here.
    pub password: Option<String>,
    pub uid: PosixId,
    /// Primary group id.
    pub gid: PosixId,
    /// Descriptive text (GECOS field).
    pub gecos: Option<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
}

impl PosixAccountAttrs {
    /// Creates an attribute set with only the mandatory fields.
    pub fn new(name: impl Into<String>, uid: PosixId, gid: PosixId) -> Self {
        Self {
            name: name.into(),
            password: None,
            uid,
            gid,
            gecos: None,
            home: None,
            shell: None,
        }
    }

    pub fn validate(&self) -> Result<(), EntryValidationError> {
        validate_name(EntryKind::Account, &self.name)?;
        validate_id(EntryKind::Account, "uid", self.uid)?;
        validate_id(EntryKind::Account, "gid", self.gid)?;
        Ok(())
    }

    /// Scalar attributes replaced on every store, in write order.
    ///
    /// Absent optional fields map to an empty value list.
    pub fn scalar_attributes(&self) -> Vec<(&'static str, Vec<String>)> {
        vec![
            (attrs::UID_NUMBER, vec![self.uid.to_string()]),
            (attrs::GID_NUMBER, vec![self.gid.to_string()]),
            (attrs::USER_PASSWORD, self.password.iter().cloned().collect()),
            (attrs::GECOS, self.gecos.iter().cloned().collect()),
            (attrs::HOME_DIRECTORY, self.home.iter().cloned().collect()),
            (attrs::LOGIN_SHELL, self.shell.iter().cloned().collect()),
        ]
    }

    /// Attribute map for a freshly created account entry.
    pub fn to_new_entry_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            attrs::OBJECT_CLASS.to_string(),
            vec![attrs::USER_CLASS.to_string()],
        );
        attributes.insert(attrs::NAME.to_string(), vec![self.name.clone()]);
        for (attr, values) in self.scalar_attributes() {
            if !values.is_empty() {
                attributes.insert(attr.to_string(), values);
            }
        }
        attributes
    }
}

/// Account read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub domain: String,
    pub dn: Dn,
    pub name: String,
    pub uid: PosixId,
    pub gid: PosixId,
    /// Never serialized; present only so callers can compare stored state.
    #[serde(skip)]
    pub password: Option<String>,
    pub gecos: Option<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
    /// Group DNs, in the order the memberships were added.
    pub member_of: Vec<Dn>,
}

impl Account {
    /// Converts a stored entry; `Err` describes the malformed attribute.
    pub fn try_from_entry(domain: &str, entry: &Entry) -> Result<Self, String> {
        Ok(Self {
            domain: domain.to_string(),
            dn: entry.dn.clone(),
            name: entry.single(attrs::NAME)?.to_string(),
            uid: entry.single_id(attrs::UID_NUMBER)?,
            gid: entry.single_id(attrs::GID_NUMBER)?,
            password: entry.first(attrs::USER_PASSWORD).map(str::to_string),
            gecos: entry.first(attrs::GECOS).map(str::to_string),
            home: entry.first(attrs::HOME_DIRECTORY).map(str::to_string),
            shell: entry.first(attrs::LOGIN_SHELL).map(str::to_string),
            member_of: linked_entries(entry, attrs::MEMBER_OF, domain, EntryKind::Group)?,
        })
    }

    /// Whether this account lists `group_dn` in its member-of set.
    pub fn is_member_of(&self, group_dn: &Dn) -> bool {
        self.member_of.contains(group_dn)
    }
}
