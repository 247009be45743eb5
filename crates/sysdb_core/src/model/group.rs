//! POSIX group model.

use crate::model::address::{linked_entries, EntryKind};
use crate::model::attrs;
use crate::model::dn::Dn;
use crate::model::entry::{Attributes, Entry};
use crate::model::validation::{validate_id, validate_name, EntryValidationError, PosixId};
use serde::{Deserialize, Serialize};

/// Attribute set supplied to `store_group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixGroupAttrs {
    pub name: String,
    pub gid: PosixId,
}

impl PosixGroupAttrs {
    pub fn new(name: impl Into<String>, gid: PosixId) -> Self {
        Self {
            name: name.into(),
            gid,
        }
    }

    pub fn validate(&self) -> Result<(), EntryValidationError> {
        validate_name(EntryKind::Group, &self.name)?;
        validate_id(EntryKind::Group, "gid", self.gid)?;
        Ok(())
    }

    pub fn to_new_entry_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            attrs::OBJECT_CLASS.to_string(),
            vec![attrs::GROUP_CLASS.to_string()],
        );
        attributes.insert(attrs::NAME.to_string(), vec![self.name.clone()]);
        attributes.insert(attrs::GID_NUMBER.to_string(), vec![self.gid.to_string()]);
        attributes
    }
}

/// Group read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub domain: String,
    pub dn: Dn,
    pub name: String,
    pub gid: PosixId,
    /// Account DNs, in the order they were added.
    pub members: Vec<Dn>,
}

impl Group {
    pub fn try_from_entry(domain: &str, entry: &Entry) -> Result<Self, String> {
        Ok(Self {
            domain: domain.to_string(),
            dn: entry.dn.clone(),
            name: entry.single(attrs::NAME)?.to_string(),
            gid: entry.single_id(attrs::GID_NUMBER)?,
            members: linked_entries(entry, attrs::MEMBER, domain, EntryKind::Account)?,
        })
    }

    pub fn has_member(&self, account_dn: &Dn) -> bool {
        self.members.contains(account_dn)
    }
}
