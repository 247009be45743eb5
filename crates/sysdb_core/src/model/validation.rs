//! Input validation shared by account and group writes.

use crate::model::address::EntryKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// POSIX user or group id.
pub type PosixId = u32;

/// `(uid_t)-1`, never a valid id.
pub const INVALID_ID: PosixId = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValidationError {
    /// Name is blank after trim.
    EmptyName(EntryKind),
    /// Name contains NUL or line breaks.
    InvalidName { kind: EntryKind, name: String },
    /// Id equals the reserved invalid id.
    InvalidId {
        kind: EntryKind,
        field: &'static str,
        value: PosixId,
    },
}

impl Display for EntryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName(kind) => write!(f, "{kind} name must not be empty"),
            Self::InvalidName { kind, name } => {
                write!(f, "{kind} name {name:?} contains control characters")
            }
            Self::InvalidId { kind, field, value } => {
                write!(f, "{kind} {field} {value} is not a valid id")
            }
        }
    }
}

impl Error for EntryValidationError {}

pub fn validate_name(kind: EntryKind, name: &str) -> Result<(), EntryValidationError> {
    if name.trim().is_empty() {
        return Err(EntryValidationError::EmptyName(kind));
    }
    if name.contains(['\0', '\n', '\r']) {
        return Err(EntryValidationError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

pub fn validate_id(
    kind: EntryKind,
    field: &'static str,
    value: PosixId,
) -> Result<(), EntryValidationError> {
    if value == INVALID_ID {
        return Err(EntryValidationError::InvalidId { kind, field, value });
    }
    Ok(())
}
