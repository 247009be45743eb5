//! Identity cache use cases.
//!
//! # Responsibility
//! - Turn account/group requests into entry repository searches and
//!   mutation batches.
//! - Keep callers away from DN layout and storage details.

mod membership;
mod query;
pub mod sysdb_service;
mod upsert;
