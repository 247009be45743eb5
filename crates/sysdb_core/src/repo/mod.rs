//! Persistence layer for DN-addressed entries.
//!
//! # Responsibility
//! - Define the storage engine contract (search + atomic mutation batches).
//! - Keep SQLite query details away from the sysdb service.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NoSuchEntry`,
//!   `EntryAlreadyExists`) in addition to DB transport errors.

pub mod entry_repo;
