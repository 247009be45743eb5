//! Account/group scenario run against a live service.
//!
//! Every step is recorded as one check; a failed step does not stop the run.

use std::collections::HashSet;
use std::fmt::Display;
use sysdb_core::{
    entry_dn, EntryKind, EntryRepository, PosixAccountAttrs, PosixGroupAttrs, SysdbError,
    SysdbService,
};

const FIRST_ID: u32 = 26000;
const ACCOUNT_COUNT: u32 = 10;
const GROUP_NAME: &str = "sysdbtestgroup";
const GROUP_GID: u32 = 27000;
const GROUP_NEW_GID: u32 = 27001;

#[derive(Default)]
pub struct Report {
    checks: Vec<(bool, String)>,
}

impl Report {
    fn record(&mut self, passed: bool, label: impl Display) {
        self.checks.push((passed, label.to_string()));
    }

    fn expect_ok<T>(&mut self, label: impl Display, result: Result<T, SysdbError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.record(true, label);
                Some(value)
            }
            Err(err) => {
                self.record(false, format!("{label}: {err}"));
                None
            }
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.checks.iter().map(|(passed, label)| {
            let status = if *passed { "ok" } else { "FAIL" };
            format!("{status} - {label}")
        })
    }

    pub fn failures(&self) -> usize {
        self.checks.iter().filter(|(passed, _)| !passed).count()
    }

    pub fn passed(&self) -> bool {
        self.failures() == 0
    }
}

fn account_name(id: u32) -> String {
    format!("testuser{id}")
}

fn test_account(id: u32) -> PosixAccountAttrs {
    let name = account_name(id);
    let mut account = PosixAccountAttrs::new(&name, id, id);
    account.password = Some("password".to_string());
    account.gecos = Some("Test User".to_string());
    account.home = Some(format!("/home/{name}"));
    account.shell = Some("/bin/bash".to_string());
    account
}

pub fn run<R: EntryRepository>(sysdb: &SysdbService<R>, domain: &str) -> Report {
    let mut report = Report::default();
    let ids: Vec<u32> = (FIRST_ID..FIRST_ID + ACCOUNT_COUNT).collect();

    for &id in &ids {
        let result = sysdb.store_account(domain, &test_account(id));
        report.expect_ok(format!("store account {}", account_name(id)), result);
    }

    let result = sysdb.store_group(domain, &PosixGroupAttrs::new(GROUP_NAME, GROUP_GID));
    report.expect_ok(format!("store group {GROUP_NAME} gid {GROUP_GID}"), result);
    let found = sysdb.find_group_by_gid(domain, GROUP_GID);
    if let Some(group) = report.expect_ok(format!("find group by gid {GROUP_GID}"), found) {
        report.record(group.name == GROUP_NAME, "gid lookup returns the group");
    }

    let result = sysdb.store_group(domain, &PosixGroupAttrs::new(GROUP_NAME, GROUP_NEW_GID));
    report.expect_ok(format!("update group {GROUP_NAME} to gid {GROUP_NEW_GID}"), result);
    report.record(
        matches!(
            sysdb.find_group_by_gid(domain, GROUP_GID),
            Err(SysdbError::NotFound { .. })
        ),
        format!("old gid {GROUP_GID} no longer resolves"),
    );
    let found = sysdb.find_group_by_gid(domain, GROUP_NEW_GID);
    report.expect_ok(format!("find group by gid {GROUP_NEW_GID}"), found);
    let found = sysdb.find_group_by_name(domain, GROUP_NAME);
    if let Some(group) = report.expect_ok(format!("find group by name {GROUP_NAME}"), found) {
        report.record(group.gid == GROUP_NEW_GID, "name lookup shows the new gid");
    }

    for pass in ["add", "re-add"] {
        for &id in &ids {
            let result = sysdb.add_account_to_group(domain, GROUP_NAME, &account_name(id));
            report.expect_ok(format!("{pass} {} to {GROUP_NAME}", account_name(id)), result);
        }
        verify_membership(sysdb, domain, &ids, pass, &mut report);
    }

    report
}

fn verify_membership<R: EntryRepository>(
    sysdb: &SysdbService<R>,
    domain: &str,
    ids: &[u32],
    pass: &str,
    report: &mut Report,
) {
    let members = sysdb.group_members(domain, GROUP_NAME);
    if let Some(members) = report.expect_ok(format!("{pass}: list group members"), members) {
        let unique: HashSet<_> = members.iter().collect();
        let expected: Vec<_> = ids
            .iter()
            .filter_map(|&id| entry_dn(domain, EntryKind::Account, &account_name(id)).ok())
            .collect();
        report.record(
            members.len() == ids.len() && unique.len() == ids.len(),
            format!("{pass}: group has {} distinct members", ids.len()),
        );
        report.record(
            expected.iter().all(|dn| unique.contains(dn)),
            format!("{pass}: every account is a member"),
        );
    }

    let Ok(group_dn) = entry_dn(domain, EntryKind::Group, GROUP_NAME) else {
        report.record(false, format!("{pass}: group address"));
        return;
    };
    for &id in ids {
        let name = account_name(id);
        let member_of = sysdb.account_member_of(domain, &name);
        if let Some(member_of) = report.expect_ok(format!("{pass}: member-of of {name}"), member_of)
        {
            report.record(
                member_of == [group_dn.clone()],
                format!("{pass}: {name} is in exactly {GROUP_NAME}"),
            );
        }
    }
}
