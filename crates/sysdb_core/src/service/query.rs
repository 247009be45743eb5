//! Lookups and membership projections.
//!
//! # Responsibility
//! - Resolve accounts and groups by natural key or numeric id.
//! - Project the member / member-of sets of one entry.
//!
//! # Invariants
//! - Every lookup is an exact-match, one-level search under the domain's
//!   container for the requested kind.
//! - Zero matches is `NotFound`, more than one is `Corruption`. A uid shared
//!   by several accounts therefore cannot be resolved by uid.

use super::sysdb_service::{SysdbError, SysdbResult, SysdbService};
use crate::model::account::Account;
use crate::model::address::{container_dn, EntryKind};
use crate::model::attrs;
use crate::model::dn::Dn;
use crate::model::entry::Entry;
use crate::model::group::Group;
use crate::model::validation::{validate_id, validate_name, PosixId};
use crate::repo::entry_repo::{EntryRepository, Filter, SearchRequest, SearchScope};
use log::debug;

impl<R: EntryRepository> SysdbService<R> {
    pub fn find_group_by_name(&self, domain: &str, name: &str) -> SysdbResult<Group> {
        validate_name(EntryKind::Group, name)?;
        let entry = self.find_unique(domain, EntryKind::Group, attrs::NAME, name)?;
        decode_group(domain, name, &entry)
    }

    pub fn find_group_by_gid(&self, domain: &str, gid: PosixId) -> SysdbResult<Group> {
        validate_id(EntryKind::Group, "gid", gid)?;
        let key = gid.to_string();
        let entry = self.find_unique(domain, EntryKind::Group, attrs::GID_NUMBER, &key)?;
        decode_group(domain, &key, &entry)
    }

    pub fn find_account_by_name(&self, domain: &str, name: &str) -> SysdbResult<Account> {
        validate_name(EntryKind::Account, name)?;
        let entry = self.find_unique(domain, EntryKind::Account, attrs::NAME, name)?;
        decode_account(domain, name, &entry)
    }

    pub fn find_account_by_uid(&self, domain: &str, uid: PosixId) -> SysdbResult<Account> {
        validate_id(EntryKind::Account, "uid", uid)?;
        let key = uid.to_string();
        let entry = self.find_unique(domain, EntryKind::Account, attrs::UID_NUMBER, &key)?;
        decode_account(domain, &key, &entry)
    }

    /// Addresses of the accounts in `group`, in insertion order.
    pub fn group_members(&self, domain: &str, group: &str) -> SysdbResult<Vec<Dn>> {
        Ok(self.find_group_by_name(domain, group)?.members)
    }

    /// Addresses of the groups `account` belongs to, in insertion order.
    pub fn account_member_of(&self, domain: &str, account: &str) -> SysdbResult<Vec<Dn>> {
        Ok(self.find_account_by_name(domain, account)?.member_of)
    }

    /// Every account of the domain, ordered by address.
    pub fn list_accounts(&self, domain: &str) -> SysdbResult<Vec<Account>> {
        self.list_kind(domain, EntryKind::Account)?
            .iter()
            .map(|entry| decode_account(domain, &entry.dn.to_string(), entry))
            .collect()
    }

    /// Every group of the domain, ordered by address.
    pub fn list_groups(&self, domain: &str) -> SysdbResult<Vec<Group>> {
        self.list_kind(domain, EntryKind::Group)?
            .iter()
            .map(|entry| decode_group(domain, &entry.dn.to_string(), entry))
            .collect()
    }

    fn list_kind(&self, domain: &str, kind: EntryKind) -> SysdbResult<Vec<Entry>> {
        self.domain_config(domain)?;
        let request = SearchRequest::new(container_dn(domain, kind)?, SearchScope::OneLevel)
            .with_filter(Filter::equality(attrs::OBJECT_CLASS, kind.object_class()));
        self.repo
            .search(&request)
            .map_err(|err| SysdbError::storage("list", domain, err))
    }

    /// Single entry of `kind` whose `attr` equals `value`.
    fn find_unique(
        &self,
        domain: &str,
        kind: EntryKind,
        attr: &str,
        value: &str,
    ) -> SysdbResult<Entry> {
        self.domain_config(domain)?;
        let request = SearchRequest::new(container_dn(domain, kind)?, SearchScope::OneLevel)
            .with_filter(Filter::and([
                Filter::equality(attrs::OBJECT_CLASS, kind.object_class()),
                Filter::equality(attr, value),
            ]));
        let mut matches = self
            .repo
            .search(&request)
            .map_err(|err| SysdbError::storage("lookup", domain, err))?;

        debug!(
            "event=sysdb_lookup module=sysdb status=ok domain={domain} kind={kind} attr={attr} matches={}",
            matches.len()
        );
        match matches.len() {
            0 => Err(SysdbError::not_found(domain, kind, value)),
            1 => Ok(matches.remove(0)),
            count => Err(SysdbError::corruption(
                domain,
                kind,
                value,
                format!("{count} entries share {attr}={value}"),
            )),
        }
    }
}

fn decode_group(domain: &str, key: &str, entry: &Entry) -> SysdbResult<Group> {
    Group::try_from_entry(domain, entry)
        .map_err(|reason| SysdbError::corruption(domain, EntryKind::Group, key, reason))
}

fn decode_account(domain: &str, key: &str, entry: &Entry) -> SysdbResult<Account> {
    Account::try_from_entry(domain, entry)
        .map_err(|reason| SysdbError::corruption(domain, EntryKind::Account, key, reason))
}
