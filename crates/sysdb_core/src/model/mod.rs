//! Domain model for the identity cache.
//!
//! # Responsibility
//! - Define DN addressing, generic entries and the account/group records
//!   built on top of them.
//! - Validate caller input before it reaches storage.
//!
//! # Invariants
//! - Every account and group is identified by its canonical DN.
//! - The membership relation is stored on both sides (`member`/`memberOf`).

pub mod account;
pub mod address;
pub mod attrs;
pub mod dn;
pub mod entry;
pub mod group;
pub mod validation;
