//! Account and group upserts.
//!
//! # Invariants
//! - Create when absent, otherwise replace scalar attributes in place.
//! - `member`/`memberOf` are never written here.
//! - The existence check, the gid check and every write of one upsert run
//!   in one repository write transaction.
//! - A gid belongs to at most one group per domain.

use super::sysdb_service::{
    ensure_id_in_range, log_outcome, SysdbError, SysdbResult, SysdbService, WriteOutcome,
};
use crate::model::account::PosixAccountAttrs;
use crate::model::address::{container_dn, entry_dn, EntryKind};
use crate::model::attrs;
use crate::model::dn::Dn;
use crate::model::entry::{Attributes, Entry};
use crate::model::group::PosixGroupAttrs;
use crate::model::validation::PosixId;
use crate::repo::entry_repo::{
    EntryRepository, EntryStore, Filter, Mutation, RepoError, SearchRequest, SearchScope,
};
use std::time::Instant;

impl<R: EntryRepository> SysdbService<R> {
    /// Creates or updates one POSIX account.
    ///
    /// # Contract
    /// - Re-storing identical attributes returns `Unchanged` and writes nothing.
    /// - The account's member-of set is preserved on update.
    /// - A failed store leaves the prior entry untouched.
    pub fn store_account(
        &self,
        domain: &str,
        account: &PosixAccountAttrs,
    ) -> SysdbResult<WriteOutcome> {
        let started_at = Instant::now();
        let result = self.store_account_inner(domain, account);
        log_outcome(
            "store_account",
            domain,
            &account.name,
            started_at,
            &result,
            |outcome| format!("uid={} gid={} outcome={}", account.uid, account.gid, outcome.as_str()),
        );
        result
    }

    /// Creates or updates one POSIX group.
    ///
    /// # Contract
    /// - Only the gid is replaced on update; the member set is preserved.
    /// - The old gid stops resolving in the same transaction that makes the
    ///   new one resolve.
    pub fn store_group(&self, domain: &str, group: &PosixGroupAttrs) -> SysdbResult<WriteOutcome> {
        let started_at = Instant::now();
        let result = self.store_group_inner(domain, group);
        log_outcome(
            "store_group",
            domain,
            &group.name,
            started_at,
            &result,
            |outcome| format!("gid={} outcome={}", group.gid, outcome.as_str()),
        );
        result
    }

    fn store_account_inner(
        &self,
        domain: &str,
        account: &PosixAccountAttrs,
    ) -> SysdbResult<WriteOutcome> {
        let domain_config = self.domain_config(domain)?;
        account.validate()?;
        ensure_id_in_range(domain_config, EntryKind::Account, "uid", account.uid)?;
        ensure_id_in_range(domain_config, EntryKind::Account, "gid", account.gid)?;
        let dn = entry_dn(domain, EntryKind::Account, &account.name)?;

        self.repo
            .transaction_with(|store| {
                upsert_entry(
                    store,
                    "store_account",
                    domain,
                    &dn,
                    account.to_new_entry_attributes(),
                    account.scalar_attributes(),
                )
            })
            .map_err(|err| SysdbError::storage("store_account", domain, err))?
    }

    fn store_group_inner(&self, domain: &str, group: &PosixGroupAttrs) -> SysdbResult<WriteOutcome> {
        let domain_config = self.domain_config(domain)?;
        group.validate()?;
        ensure_id_in_range(domain_config, EntryKind::Group, "gid", group.gid)?;
        let dn = entry_dn(domain, EntryKind::Group, &group.name)?;

        self.repo
            .transaction_with(|store| -> SysdbResult<WriteOutcome> {
                ensure_gid_unclaimed(store, domain, group.gid, &dn)?;
                upsert_entry(
                    store,
                    "store_group",
                    domain,
                    &dn,
                    group.to_new_entry_attributes(),
                    vec![(attrs::GID_NUMBER, vec![group.gid.to_string()])],
                )
            })
            .map_err(|err| SysdbError::storage("store_group", domain, err))?
    }
}

/// Adds `dn` when absent, otherwise replaces the scalars that differ.
fn upsert_entry(
    store: &dyn EntryStore,
    operation: &'static str,
    domain: &str,
    dn: &Dn,
    new_attributes: Attributes,
    scalars: Vec<(&'static str, Vec<String>)>,
) -> SysdbResult<WriteOutcome> {
    let storage = |err: RepoError| SysdbError::storage(operation, domain, err);
    let Some(entry) = store.get_entry(dn).map_err(storage)? else {
        store
            .apply(&Mutation::Add {
                dn: dn.clone(),
                attributes: new_attributes,
            })
            .map_err(storage)?;
        return Ok(WriteOutcome::Created);
    };

    let mutations = changed_scalars(&entry, scalars);
    if mutations.is_empty() {
        return Ok(WriteOutcome::Unchanged);
    }
    for mutation in &mutations {
        store.apply(mutation).map_err(storage)?;
    }
    Ok(WriteOutcome::Updated)
}

/// Fails when a group other than `dn` already carries `gid`.
fn ensure_gid_unclaimed(
    store: &dyn EntryStore,
    domain: &str,
    gid: PosixId,
    dn: &Dn,
) -> SysdbResult<()> {
    let kind = EntryKind::Group;
    let request = SearchRequest::new(container_dn(domain, kind)?, SearchScope::OneLevel)
        .with_filter(Filter::and([
            Filter::equality(attrs::OBJECT_CLASS, kind.object_class()),
            Filter::equality(attrs::GID_NUMBER, gid),
        ]))
        .with_attributes(&[attrs::NAME]);
    let holders = store
        .search(&request)
        .map_err(|err| SysdbError::storage("store_group", domain, err))?;

    match holders.iter().find(|entry| entry.dn != *dn) {
        Some(holder) => Err(SysdbError::InvalidArgument(format!(
            "group gid {gid} in domain `{domain}` is already assigned to {}",
            holder.dn
        ))),
        None => Ok(()),
    }
}

/// `Replace` mutations for attributes whose stored values differ.
fn changed_scalars(entry: &Entry, scalars: Vec<(&'static str, Vec<String>)>) -> Vec<Mutation> {
    scalars
        .into_iter()
        .filter(|(attr, values)| entry.values(attr) != values.as_slice())
        .map(|(attr, values)| Mutation::Replace {
            dn: entry.dn.clone(),
            attribute: attr.to_string(),
            values,
        })
        .collect()
}
