use std::collections::HashSet;
use sysdb_core::db::open_db;
use sysdb_core::{
    entry_dn, EntryKind, PosixAccountAttrs, PosixGroupAttrs, SqliteEntryRepository, SysdbConfig,
    SysdbError, SysdbService, WriteOutcome,
};

const DOMAIN: &str = "LOCAL";
const GROUP: &str = "sysdbtestgroup";

fn test_account(id: u32) -> PosixAccountAttrs {
    let name = format!("testuser{id}");
    let mut account = PosixAccountAttrs::new(&name, id, id);
    account.password = Some("password".to_string());
    account.gecos = Some("Test User".to_string());
    account.home = Some(format!("/home/{name}"));
    account.shell = Some("/bin/bash".to_string());
    account
}

#[test]
fn local_domain_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("cache.sqlite3")).unwrap();
    let repo = SqliteEntryRepository::try_new(&conn).unwrap();
    let sysdb = SysdbService::try_new(repo, &SysdbConfig::default()).unwrap();
    let ids: Vec<u32> = (26000..26010).collect();

    for &id in &ids {
        let outcome = sysdb.store_account(DOMAIN, &test_account(id)).unwrap();
        assert_eq!(outcome, WriteOutcome::Created);
    }

    sysdb
        .store_group(DOMAIN, &PosixGroupAttrs::new(GROUP, 27000))
        .unwrap();
    assert_eq!(sysdb.find_group_by_gid(DOMAIN, 27000).unwrap().name, GROUP);

    sysdb
        .store_group(DOMAIN, &PosixGroupAttrs::new(GROUP, 27001))
        .unwrap();
    assert!(matches!(
        sysdb.find_group_by_gid(DOMAIN, 27000),
        Err(SysdbError::NotFound { .. })
    ));
    assert_eq!(sysdb.find_group_by_gid(DOMAIN, 27001).unwrap().name, GROUP);
    assert_eq!(sysdb.find_group_by_name(DOMAIN, GROUP).unwrap().gid, 27001);

    for &id in &ids {
        sysdb
            .add_account_to_group(DOMAIN, GROUP, &format!("testuser{id}"))
            .unwrap();
    }

    let group_dn = entry_dn(DOMAIN, EntryKind::Group, GROUP).unwrap();
    let expected_members: Vec<_> = ids
        .iter()
        .map(|id| entry_dn(DOMAIN, EntryKind::Account, &format!("testuser{id}")).unwrap())
        .collect();
    assert_eq!(sysdb.group_members(DOMAIN, GROUP).unwrap(), expected_members);
    for &id in &ids {
        let account = sysdb
            .find_account_by_name(DOMAIN, &format!("testuser{id}"))
            .unwrap();
        assert_eq!(account.uid, id);
        assert_eq!(account.home, Some(format!("/home/testuser{id}")));
        assert_eq!(account.member_of, vec![group_dn.clone()]);
    }

    // Second pass must not duplicate anything.
    for &id in &ids {
        let outcome = sysdb
            .add_account_to_group(DOMAIN, GROUP, &format!("testuser{id}"))
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
    }
    let members = sysdb.group_members(DOMAIN, GROUP).unwrap();
    assert_eq!(members.len(), ids.len());
    assert_eq!(members.iter().collect::<HashSet<_>>().len(), ids.len());
    for &id in &ids {
        let member_of = sysdb
            .account_member_of(DOMAIN, &format!("testuser{id}"))
            .unwrap();
        assert_eq!(member_of.len(), 1);
    }
}
