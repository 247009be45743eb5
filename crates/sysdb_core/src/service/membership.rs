//! Group membership linking.
//!
//! # Invariants
//! - `member` on the group and `memberOf` on the account are written in the
//!   same transaction; a failure leaves both sides as they were.
//! - Both entries are read in the transaction that writes them.
//! - Linking an already-linked pair writes nothing.
//! - A half-linked pair (one side only) is completed, not duplicated.

use super::sysdb_service::{log_outcome, SysdbError, SysdbResult, SysdbService, WriteOutcome};
use crate::model::account::Account;
use crate::model::address::{entry_dn, EntryKind};
use crate::model::attrs;
use crate::model::dn::Dn;
use crate::model::entry::Entry;
use crate::model::group::Group;
use crate::model::validation::validate_name;
use crate::repo::entry_repo::{EntryRepository, EntryStore, Mutation};
use std::time::Instant;

impl<R: EntryRepository> SysdbService<R> {
    /// Makes `account_name` a member of `group_name` in `domain`.
    ///
    /// # Errors
    /// - `NotFound` when either entry does not exist.
    /// - `Corruption` when either stored entry cannot be decoded.
    pub fn add_account_to_group(
        &self,
        domain: &str,
        group_name: &str,
        account_name: &str,
    ) -> SysdbResult<WriteOutcome> {
        let started_at = Instant::now();
        let result = self.add_account_to_group_inner(domain, group_name, account_name);
        let key = format!("{group_name}<-{account_name}");
        log_outcome("add_member", domain, &key, started_at, &result, |outcome| {
            format!("outcome={}", outcome.as_str())
        });
        result
    }

    fn add_account_to_group_inner(
        &self,
        domain: &str,
        group_name: &str,
        account_name: &str,
    ) -> SysdbResult<WriteOutcome> {
        self.domain_config(domain)?;
        validate_name(EntryKind::Group, group_name)?;
        validate_name(EntryKind::Account, account_name)?;
        let group_dn = entry_dn(domain, EntryKind::Group, group_name)?;
        let account_dn = entry_dn(domain, EntryKind::Account, account_name)?;

        self.repo
            .transaction_with(|store| -> SysdbResult<WriteOutcome> {
                let group_entry =
                    load_for_link(store, domain, EntryKind::Group, group_name, &group_dn)?;
                let account_entry =
                    load_for_link(store, domain, EntryKind::Account, account_name, &account_dn)?;
                let group = Group::try_from_entry(domain, &group_entry).map_err(|reason| {
                    SysdbError::corruption(domain, EntryKind::Group, group_name, reason)
                })?;
                let account = Account::try_from_entry(domain, &account_entry).map_err(|reason| {
                    SysdbError::corruption(domain, EntryKind::Account, account_name, reason)
                })?;

                if group.has_member(&account_dn) && account.is_member_of(&group_dn) {
                    return Ok(WriteOutcome::Unchanged);
                }

                let mutations = [
                    Mutation::AddValues {
                        dn: group_dn.clone(),
                        attribute: attrs::MEMBER.to_string(),
                        values: vec![account_dn.to_string()],
                    },
                    Mutation::AddValues {
                        dn: account_dn.clone(),
                        attribute: attrs::MEMBER_OF.to_string(),
                        values: vec![group_dn.to_string()],
                    },
                ];
                for mutation in &mutations {
                    store
                        .apply(mutation)
                        .map_err(|err| SysdbError::storage("add_member", domain, err))?;
                }
                Ok(WriteOutcome::Updated)
            })
            .map_err(|err| SysdbError::storage("add_member", domain, err))?
    }
}

/// Reads one side of the link inside the open write transaction.
fn load_for_link(
    store: &dyn EntryStore,
    domain: &str,
    kind: EntryKind,
    name: &str,
    dn: &Dn,
) -> SysdbResult<Entry> {
    store
        .get_entry(dn)
        .map_err(|err| SysdbError::storage("add_member", domain, err))?
        .ok_or_else(|| SysdbError::not_found(domain, kind, name))
}
