//! Local POSIX identity cache.
//! Accounts and groups live as DN-addressed entries in an embedded SQLite
//! store; this crate owns their addressing, upsert and membership invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{load_config, ConfigError, DomainConfig, SysdbConfig, DEFAULT_DOMAIN};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{init_logging, init_stderr_logging, LogTarget};
pub use model::account::{Account, PosixAccountAttrs};
pub use model::address::{container_dn, entry_dn, EntryKind};
pub use model::dn::Dn;
pub use model::group::{Group, PosixGroupAttrs};
pub use model::validation::PosixId;
pub use repo::entry_repo::{
    EntryRepository, EntryStore, RepoError, RepoResult, SqliteEntryRepository,
};
pub use service::sysdb_service::{SysdbError, SysdbResult, SysdbService, WriteOutcome};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
