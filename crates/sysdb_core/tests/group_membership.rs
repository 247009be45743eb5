use rusqlite::Connection;
use sysdb_core::db::open_db_in_memory;
use sysdb_core::{
    entry_dn, EntryKind, PosixAccountAttrs, PosixGroupAttrs, SqliteEntryRepository, SysdbConfig,
    SysdbError, SysdbService, WriteOutcome,
};

fn service(conn: &Connection) -> SysdbService<SqliteEntryRepository<'_>> {
    let repo = SqliteEntryRepository::try_new(conn).unwrap();
    let sysdb = SysdbService::try_new(repo, &SysdbConfig::default()).unwrap();
    sysdb
        .store_group("LOCAL", &PosixGroupAttrs::new("staff", 100))
        .unwrap();
    for (name, uid) in [("alice", 1000), ("bob", 1001)] {
        sysdb
            .store_account("LOCAL", &PosixAccountAttrs::new(name, uid, 100))
            .unwrap();
    }
    sysdb
}

fn value_rows(conn: &Connection, attr: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM entry_values WHERE attr = ?1;",
        [attr],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn add_member_links_both_sides() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);

    let outcome = sysdb.add_account_to_group("LOCAL", "staff", "alice").unwrap();
    assert_eq!(outcome, WriteOutcome::Updated);

    let group = sysdb.find_group_by_name("LOCAL", "staff").unwrap();
    let account = sysdb.find_account_by_name("LOCAL", "alice").unwrap();
    assert!(group.has_member(&account.dn));
    assert!(account.is_member_of(&group.dn));
    assert!(sysdb.account_member_of("LOCAL", "bob").unwrap().is_empty());
}

#[test]
fn repeated_add_member_creates_no_duplicates() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);

    sysdb.add_account_to_group("LOCAL", "staff", "alice").unwrap();
    let outcome = sysdb.add_account_to_group("LOCAL", "staff", "alice").unwrap();
    assert_eq!(outcome, WriteOutcome::Unchanged);

    assert_eq!(sysdb.group_members("LOCAL", "staff").unwrap().len(), 1);
    assert_eq!(sysdb.account_member_of("LOCAL", "alice").unwrap().len(), 1);
    assert_eq!(value_rows(&conn, "member"), 1);
    assert_eq!(value_rows(&conn, "memberOf"), 1);
}

#[test]
fn members_keep_insertion_order() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);

    sysdb.add_account_to_group("LOCAL", "staff", "bob").unwrap();
    sysdb.add_account_to_group("LOCAL", "staff", "alice").unwrap();

    assert_eq!(
        sysdb.group_members("LOCAL", "staff").unwrap(),
        vec![
            entry_dn("LOCAL", EntryKind::Account, "bob").unwrap(),
            entry_dn("LOCAL", EntryKind::Account, "alice").unwrap(),
        ]
    );
}

#[test]
fn missing_group_or_account_is_not_found_and_creates_nothing() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);

    match sysdb.add_account_to_group("LOCAL", "nogroup", "alice") {
        Err(SysdbError::NotFound { kind, key, .. }) => {
            assert_eq!(kind, EntryKind::Group);
            assert_eq!(key, "nogroup");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    match sysdb.add_account_to_group("LOCAL", "staff", "nobody") {
        Err(SysdbError::NotFound { kind, key, .. }) => {
            assert_eq!(kind, EntryKind::Account);
            assert_eq!(key, "nobody");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(matches!(
        sysdb.find_group_by_name("LOCAL", "nogroup"),
        Err(SysdbError::NotFound { .. })
    ));
    assert!(sysdb.group_members("LOCAL", "staff").unwrap().is_empty());
    assert_eq!(value_rows(&conn, "member"), 0);
    assert_eq!(value_rows(&conn, "memberOf"), 0);
}

#[test]
fn storage_failure_on_second_side_leaves_both_sides_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    conn.execute_batch(
        "CREATE TRIGGER fail_member_of
         BEFORE INSERT ON entry_values
         WHEN NEW.attr = 'memberOf'
         BEGIN
             SELECT RAISE(ABORT, 'injected failure');
         END;",
    )
    .unwrap();

    let err = sysdb
        .add_account_to_group("LOCAL", "staff", "alice")
        .unwrap_err();
    assert!(matches!(err, SysdbError::StorageFailure { .. }), "{err}");
    assert_eq!(err.code(), "storage_failure");

    assert!(sysdb.group_members("LOCAL", "staff").unwrap().is_empty());
    assert!(sysdb.account_member_of("LOCAL", "alice").unwrap().is_empty());
    assert_eq!(value_rows(&conn, "member"), 0);

    conn.execute_batch("DROP TRIGGER fail_member_of;").unwrap();
    sysdb.add_account_to_group("LOCAL", "staff", "alice").unwrap();
    assert_eq!(sysdb.group_members("LOCAL", "staff").unwrap().len(), 1);
}

#[test]
fn half_linked_pair_is_completed() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    let group_dn = entry_dn("LOCAL", EntryKind::Group, "staff").unwrap();
    let alice_dn = entry_dn("LOCAL", EntryKind::Account, "alice").unwrap();
    conn.execute(
        "INSERT INTO entry_values (dn, attr, value, ordinal) VALUES (?1, 'member', ?2, 0);",
        [group_dn.to_string(), alice_dn.to_string()],
    )
    .unwrap();

    let outcome = sysdb.add_account_to_group("LOCAL", "staff", "alice").unwrap();
    assert_eq!(outcome, WriteOutcome::Updated);
    assert_eq!(sysdb.account_member_of("LOCAL", "alice").unwrap(), vec![group_dn]);
    assert_eq!(value_rows(&conn, "member"), 1);
}
