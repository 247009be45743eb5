use rusqlite::Connection;
use sysdb_core::db::open_db_in_memory;
use sysdb_core::model::entry::Attributes;
use sysdb_core::repo::entry_repo::Mutation;
use sysdb_core::{
    entry_dn, EntryKind, EntryRepository, PosixAccountAttrs, PosixGroupAttrs,
    SqliteEntryRepository, SysdbConfig, SysdbError, SysdbService,
};

fn service(conn: &Connection) -> SysdbService<SqliteEntryRepository<'_>> {
    let repo = SqliteEntryRepository::try_new(conn).unwrap();
    SysdbService::try_new(repo, &SysdbConfig::default()).unwrap()
}

/// Writes an entry straight through the repository, bypassing upsert checks.
fn inject(
    sysdb: &SysdbService<SqliteEntryRepository<'_>>,
    kind: EntryKind,
    rdn_name: &str,
    pairs: &[(&str, &str)],
) {
    let mut attributes = Attributes::new();
    for (attr, value) in pairs {
        attributes
            .entry(attr.to_string())
            .or_default()
            .push(value.to_string());
    }
    sysdb
        .repository()
        .transaction(&[Mutation::Add {
            dn: entry_dn("LOCAL", kind, rdn_name).unwrap(),
            attributes,
        }])
        .unwrap();
}

fn assert_corruption<T: std::fmt::Debug>(result: Result<T, SysdbError>) {
    match result {
        Err(err @ SysdbError::Corruption { .. }) => assert_eq!(err.code(), "corruption"),
        other => panic!("expected corruption, got {other:?}"),
    }
}

#[test]
fn duplicate_gid_reports_corruption() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_group("LOCAL", &PosixGroupAttrs::new("staff", 27000))
        .unwrap();
    inject(
        &sysdb,
        EntryKind::Group,
        "shadow",
        &[("objectClass", "group"), ("gidNumber", "27000")],
    );

    assert_corruption(sysdb.find_group_by_gid("LOCAL", 27000));
    assert_eq!(sysdb.find_group_by_name("LOCAL", "staff").unwrap().gid, 27000);
}

#[test]
fn duplicate_name_attribute_reports_corruption() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 1000, 1000))
        .unwrap();
    inject(
        &sysdb,
        EntryKind::Account,
        "alias",
        &[
            ("objectClass", "user"),
            ("name", "alias"),
            ("name", "alice"),
            ("uidNumber", "1001"),
            ("gidNumber", "1000"),
        ],
    );

    assert_corruption(sysdb.find_account_by_name("LOCAL", "alice"));
    assert_corruption(sysdb.account_member_of("LOCAL", "alice"));
}

#[test]
fn undecodable_entry_reports_corruption() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 1000, 1000))
        .unwrap();
    inject(
        &sysdb,
        EntryKind::Group,
        "broken",
        &[("objectClass", "group"), ("gidNumber", "not-a-number")],
    );

    assert_corruption(sysdb.find_group_by_name("LOCAL", "broken"));
    assert_corruption(sysdb.list_groups("LOCAL"));
    assert_corruption(sysdb.add_account_to_group("LOCAL", "broken", "alice").map(|_| ()));
}

#[test]
fn member_links_to_the_wrong_kind_or_domain_report_corruption() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    let wheel = entry_dn("LOCAL", EntryKind::Group, "wheel").unwrap().to_string();
    let remote = entry_dn("REMOTE", EntryKind::Account, "bob")
        .unwrap()
        .to_string();
    inject(
        &sysdb,
        EntryKind::Group,
        "staff",
        &[
            ("objectClass", "group"),
            ("gidNumber", "100"),
            ("member", wheel.as_str()),
        ],
    );
    inject(
        &sysdb,
        EntryKind::Account,
        "alice",
        &[
            ("objectClass", "user"),
            ("uidNumber", "1000"),
            ("gidNumber", "1000"),
            ("memberOf", remote.as_str()),
        ],
    );

    assert_corruption(sysdb.find_group_by_gid("LOCAL", 100));
    assert_corruption(sysdb.group_members("LOCAL", "staff"));
    assert_corruption(sysdb.account_member_of("LOCAL", "alice"));
    assert_corruption(sysdb.find_account_by_uid("LOCAL", 1000));
}

#[test]
fn entries_of_other_classes_are_ignored_by_lookups() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    inject(
        &sysdb,
        EntryKind::Group,
        "stray",
        &[("objectClass", "container"), ("gidNumber", "500")],
    );

    assert!(matches!(
        sysdb.find_group_by_gid("LOCAL", 500),
        Err(SysdbError::NotFound { .. })
    ));
    assert!(sysdb.list_groups("LOCAL").unwrap().is_empty());
}

#[test]
fn missing_entries_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);

    assert!(matches!(
        sysdb.find_group_by_gid("LOCAL", 27000),
        Err(SysdbError::NotFound { .. })
    ));
    assert!(matches!(
        sysdb.group_members("LOCAL", "staff"),
        Err(SysdbError::NotFound { .. })
    ));
    let err = sysdb.find_account_by_name("LOCAL", "ghost").unwrap_err();
    assert_eq!(err.code(), "not_found");
    assert!(err.to_string().contains("ghost"));
}
