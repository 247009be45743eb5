//! Sysdb service facade.
//!
//! # Responsibility
//! - Own the store handle and the configured domains for one session.
//! - Define the error taxonomy shared by upsert, membership and query
//!   operations.
//! - Create the per-domain containers the other operations rely on.
//!
//! # Invariants
//! - Operations only touch configured domains.
//! - Input validation runs before the first storage call.
//! - Storage errors are surfaced with the operation and domain, never retried.

use crate::config::{ConfigError, DomainConfig, SysdbConfig};
use crate::db::DbError;
use crate::model::address::{
    container_dn, domain_dn, root_dn, AddressError, EntryKind,
};
use crate::model::attrs;
use crate::model::dn::Dn;
use crate::model::entry::Attributes;
use crate::model::validation::{EntryValidationError, PosixId};
use crate::repo::entry_repo::{EntryRepository, Mutation, RepoError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type SysdbResult<T> = Result<T, SysdbError>;

/// Errors reported by sysdb operations.
#[derive(Debug)]
pub enum SysdbError {
    /// Malformed input, unknown domain, or a gid already held by another group.
    InvalidArgument(String),
    /// Referenced account or group does not exist.
    NotFound {
        domain: String,
        kind: EntryKind,
        key: String,
    },
    /// Stored data violates a uniqueness or shape invariant.
    Corruption {
        domain: String,
        kind: EntryKind,
        key: String,
        reason: String,
    },
    /// Search or transaction failed in the storage engine.
    ///
    /// `domain` is `None` for failures outside any one domain, such as
    /// opening the store or bootstrapping containers.
    StorageFailure {
        operation: &'static str,
        domain: Option<String>,
        source: RepoError,
    },
}

impl SysdbError {
    pub(crate) fn not_found(domain: &str, kind: EntryKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            domain: domain.to_string(),
            kind,
            key: key.into(),
        }
    }

    pub(crate) fn corruption(
        domain: &str,
        kind: EntryKind,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Corruption {
            domain: domain.to_string(),
            kind,
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(operation: &'static str, domain: &str, source: RepoError) -> Self {
        Self::StorageFailure {
            operation,
            domain: Some(domain.to_string()),
            source,
        }
    }

    pub(crate) fn storage_unscoped(operation: &'static str, source: RepoError) -> Self {
        Self::StorageFailure {
            operation,
            domain: None,
            source,
        }
    }

    /// Stable machine-readable error code, used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound { .. } => "not_found",
            Self::Corruption { .. } => "corruption",
            Self::StorageFailure { .. } => "storage_failure",
        }
    }
}

impl Display for SysdbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NotFound { domain, kind, key } => {
                write!(f, "{kind} not found in domain `{domain}`: {key}")
            }
            Self::Corruption {
                domain,
                kind,
                key,
                reason,
            } => write!(
                f,
                "corrupted {kind} data in domain `{domain}` for {key}: {reason}"
            ),
            Self::StorageFailure {
                operation,
                domain: Some(domain),
                source,
            } => write!(f, "storage failure during {operation} in domain `{domain}`: {source}"),
            Self::StorageFailure {
                operation,
                domain: None,
                source,
            } => write!(f, "storage failure during {operation}: {source}"),
        }
    }
}

impl Error for SysdbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<AddressError> for SysdbError {
    fn from(value: AddressError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<EntryValidationError> for SysdbError {
    fn from(value: EntryValidationError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<ConfigError> for SysdbError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<DbError> for SysdbError {
    fn from(value: DbError) -> Self {
        Self::storage_unscoped("open", RepoError::Db(value))
    }
}

/// What a write operation did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new entry was created.
    Created,
    /// An existing entry changed.
    Updated,
    /// Stored state already matched; nothing was written.
    Unchanged,
}

impl WriteOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Identity cache operations over one entry repository.
pub struct SysdbService<R: EntryRepository> {
    pub(super) repo: R,
    pub(super) config: SysdbConfig,
}

impl<R: EntryRepository> SysdbService<R> {
    /// Creates the service and makes sure every configured domain has its
    /// `users` and `groups` containers.
    pub fn try_new(repo: R, config: &SysdbConfig) -> SysdbResult<Self> {
        config.validate()?;
        let service = Self {
            repo,
            config: config.clone(),
        };
        service.bootstrap_domains()?;
        Ok(service)
    }

    /// Underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &SysdbConfig {
        &self.config
    }

    fn bootstrap_domains(&self) -> SysdbResult<()> {
        let started_at = Instant::now();
        let mut wanted = vec![root_dn()];
        for domain in &self.config.domains {
            wanted.push(domain_dn(&domain.name)?);
            wanted.push(container_dn(&domain.name, EntryKind::Account)?);
            wanted.push(container_dn(&domain.name, EntryKind::Group)?);
        }

        let created = self
            .repo
            .transaction_with(|store| -> Result<usize, RepoError> {
                let mut created = 0;
                for dn in wanted {
                    if store.get_entry(&dn)?.is_none() {
                        store.apply(&container_mutation(dn))?;
                        created += 1;
                    }
                }
                Ok(created)
            })
            .and_then(|result| result)
            .map_err(|err| SysdbError::storage_unscoped("bootstrap", err))?;

        info!(
            "event=sysdb_bootstrap module=sysdb status=ok domains={} created_entries={} duration_ms={}",
            self.config.domains.len(),
            created,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Resolves a configured domain.
    pub(super) fn domain_config(&self, domain: &str) -> SysdbResult<&DomainConfig> {
        if domain.trim().is_empty() {
            return Err(AddressError::EmptyDomain.into());
        }
        self.config.domain(domain).ok_or_else(|| {
            SysdbError::InvalidArgument(format!("domain `{domain}` is not configured"))
        })
    }
}

fn container_mutation(dn: Dn) -> Mutation {
    let mut attributes = Attributes::new();
    attributes.insert(
        attrs::OBJECT_CLASS.to_string(),
        vec![attrs::CONTAINER_CLASS.to_string()],
    );
    Mutation::Add { dn, attributes }
}

/// Rejects ids outside the domain's configured range.
pub(super) fn ensure_id_in_range(
    domain: &DomainConfig,
    kind: EntryKind,
    field: &'static str,
    id: PosixId,
) -> SysdbResult<()> {
    if domain.contains_id(id) {
        return Ok(());
    }
    let max = domain
        .max_id
        .map_or_else(|| "unbounded".to_string(), |max_id| max_id.to_string());
    Err(SysdbError::InvalidArgument(format!(
        "{kind} {field} {id} is outside the range {}..={max} of domain `{}`",
        domain.min_id, domain.name
    )))
}

/// Emits the completion event of one public operation.
pub(super) fn log_outcome<T>(
    event: &str,
    domain: &str,
    key: &str,
    started_at: Instant,
    result: &SysdbResult<T>,
    detail: impl FnOnce(&T) -> String,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(value) => info!(
            "event={event} module=sysdb status=ok domain={domain} key={key:?} {} duration_ms={duration_ms}",
            detail(value)
        ),
        Err(err @ SysdbError::Corruption { .. }) => error!(
            "event={event} module=sysdb status=error domain={domain} key={key:?} duration_ms={duration_ms} error_code={} error={err}",
            err.code()
        ),
        Err(err) => warn!(
            "event={event} module=sysdb status=error domain={domain} key={key:?} duration_ms={duration_ms} error_code={} error={err}",
            err.code()
        ),
    }
}
