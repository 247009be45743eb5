use rusqlite::Connection;
use sysdb_core::db::open_db_in_memory;
use sysdb_core::{
    entry_dn, DomainConfig, EntryKind, EntryRepository, PosixAccountAttrs, SqliteEntryRepository,
    SysdbConfig, SysdbError, SysdbService, WriteOutcome,
};

fn service(conn: &Connection) -> SysdbService<SqliteEntryRepository<'_>> {
    let repo = SqliteEntryRepository::try_new(conn).unwrap();
    SysdbService::try_new(repo, &SysdbConfig::default()).unwrap()
}

fn full_account(name: &str, id: u32) -> PosixAccountAttrs {
    let mut account = PosixAccountAttrs::new(name, id, id);
    account.password = Some("password".to_string());
    account.gecos = Some("Test User".to_string());
    account.home = Some(format!("/home/{name}"));
    account.shell = Some("/bin/bash".to_string());
    account
}

#[test]
fn store_account_creates_entry_with_all_attributes() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);

    let outcome = sysdb
        .store_account("LOCAL", &full_account("testuser26000", 26000))
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Created);

    let account = sysdb.find_account_by_name("LOCAL", "testuser26000").unwrap();
    assert_eq!(account.uid, 26000);
    assert_eq!(account.gid, 26000);
    assert_eq!(account.password.as_deref(), Some("password"));
    assert_eq!(account.gecos.as_deref(), Some("Test User"));
    assert_eq!(account.home.as_deref(), Some("/home/testuser26000"));
    assert_eq!(account.shell.as_deref(), Some("/bin/bash"));
    assert!(account.member_of.is_empty());
    assert_eq!(
        account.dn,
        entry_dn("LOCAL", EntryKind::Account, "testuser26000").unwrap()
    );
}

#[test]
fn storing_identical_account_twice_is_a_noop() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    let account = full_account("testuser26001", 26001);

    sysdb.store_account("LOCAL", &account).unwrap();
    let outcome = sysdb.store_account("LOCAL", &account).unwrap();
    assert_eq!(outcome, WriteOutcome::Unchanged);

    assert_eq!(sysdb.list_accounts("LOCAL").unwrap().len(), 1);
    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM entry_values WHERE attr = 'uidNumber';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn restore_replaces_scalars_and_clears_absent_optionals() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_account("LOCAL", &full_account("alice", 1000))
        .unwrap();

    let mut updated = PosixAccountAttrs::new("alice", 1000, 1500);
    updated.shell = Some("/bin/zsh".to_string());
    let outcome = sysdb.store_account("LOCAL", &updated).unwrap();
    assert_eq!(outcome, WriteOutcome::Updated);

    let account = sysdb.find_account_by_name("LOCAL", "alice").unwrap();
    assert_eq!(account.gid, 1500);
    assert_eq!(account.shell.as_deref(), Some("/bin/zsh"));
    assert_eq!(account.password, None);
    assert_eq!(account.gecos, None);
    assert_eq!(account.home, None);
}

#[test]
fn restore_preserves_member_of() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_account("LOCAL", &full_account("alice", 1000))
        .unwrap();
    sysdb
        .store_group("LOCAL", &sysdb_core::PosixGroupAttrs::new("staff", 50))
        .unwrap();
    sysdb.add_account_to_group("LOCAL", "staff", "alice").unwrap();

    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 1000, 50))
        .unwrap();

    let member_of = sysdb.account_member_of("LOCAL", "alice").unwrap();
    assert_eq!(
        member_of,
        vec![entry_dn("LOCAL", EntryKind::Group, "staff").unwrap()]
    );
}

#[test]
fn find_account_by_uid_resolves_current_uid() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 1000, 1000))
        .unwrap();
    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 1001, 1000))
        .unwrap();

    assert_eq!(sysdb.find_account_by_uid("LOCAL", 1001).unwrap().name, "alice");
    assert!(matches!(
        sysdb.find_account_by_uid("LOCAL", 1000),
        Err(SysdbError::NotFound { .. })
    ));
}

#[test]
fn invalid_input_is_rejected_before_storage() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);

    let cases = [
        ("LOCAL", PosixAccountAttrs::new("", 1000, 1000)),
        ("LOCAL", PosixAccountAttrs::new("   ", 1000, 1000)),
        ("LOCAL", PosixAccountAttrs::new("bad\nname", 1000, 1000)),
        ("LOCAL", PosixAccountAttrs::new("alice", u32::MAX, 1000)),
        ("LOCAL", PosixAccountAttrs::new("alice", 1000, u32::MAX)),
        ("", PosixAccountAttrs::new("alice", 1000, 1000)),
        ("REMOTE", PosixAccountAttrs::new("alice", 1000, 1000)),
    ];
    for (domain, account) in cases {
        let err = sysdb.store_account(domain, &account).unwrap_err();
        assert!(
            matches!(err, SysdbError::InvalidArgument(_)),
            "{domain}/{}: {err}",
            account.name
        );
    }

    assert!(sysdb.list_accounts("LOCAL").unwrap().is_empty());
}

#[test]
fn accounts_may_share_a_uid() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("root", 0, 0))
        .unwrap();

    let outcome = sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("toor", 0, 0))
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Created);

    assert_eq!(sysdb.find_account_by_name("LOCAL", "root").unwrap().uid, 0);
    assert_eq!(sysdb.find_account_by_name("LOCAL", "toor").unwrap().uid, 0);
    assert_eq!(sysdb.list_accounts("LOCAL").unwrap().len(), 2);
    assert!(matches!(
        sysdb.find_account_by_uid("LOCAL", 0),
        Err(SysdbError::Corruption { .. })
    ));
}

#[test]
fn failed_update_keeps_previous_uid_and_attributes() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_account("LOCAL", &full_account("alice", 1000))
        .unwrap();
    conn.execute_batch(
        "CREATE TRIGGER fail_login_shell
         BEFORE INSERT ON entry_values
         WHEN NEW.attr = 'loginShell'
         BEGIN
             SELECT RAISE(ABORT, 'injected failure');
         END;",
    )
    .unwrap();

    let mut updated = full_account("alice", 2000);
    updated.shell = Some("/bin/zsh".to_string());
    let err = sysdb.store_account("LOCAL", &updated).unwrap_err();
    assert!(matches!(err, SysdbError::StorageFailure { .. }), "{err}");

    let account = sysdb.find_account_by_name("LOCAL", "alice").unwrap();
    assert_eq!(account.uid, 1000);
    assert_eq!(account.gid, 1000);
    assert_eq!(account.shell.as_deref(), Some("/bin/bash"));
    assert_eq!(sysdb.find_account_by_uid("LOCAL", 1000).unwrap().name, "alice");
    assert!(matches!(
        sysdb.find_account_by_uid("LOCAL", 2000),
        Err(SysdbError::NotFound { .. })
    ));

    conn.execute_batch("DROP TRIGGER fail_login_shell;").unwrap();
    let outcome = sysdb.store_account("LOCAL", &updated).unwrap();
    assert_eq!(outcome, WriteOutcome::Updated);
    assert_eq!(sysdb.find_account_by_uid("LOCAL", 2000).unwrap().name, "alice");
}

#[test]
fn ids_outside_domain_range_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEntryRepository::try_new(&conn).unwrap();
    let config = SysdbConfig {
        db_path: None,
        domains: vec![DomainConfig::new("LOCAL").with_id_range(1000, Some(2000))],
    };
    let sysdb = SysdbService::try_new(repo, &config).unwrap();

    let err = sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 999, 1000))
        .unwrap_err();
    assert!(matches!(err, SysdbError::InvalidArgument(_)));
    let err = sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 1000, 2001))
        .unwrap_err();
    assert!(matches!(err, SysdbError::InvalidArgument(_)));

    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 2000, 1000))
        .unwrap();
}

#[test]
fn names_with_dn_metacharacters_stay_inside_their_container() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    let hostile = "eve,cn=groups";

    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new(hostile, 3000, 3000))
        .unwrap();

    let account = sysdb.find_account_by_name("LOCAL", hostile).unwrap();
    assert_eq!(account.name, hostile);
    assert_eq!(
        account.dn.parent(),
        Some(sysdb_core::container_dn("LOCAL", EntryKind::Account).unwrap())
    );
    assert!(sysdb.list_groups("LOCAL").unwrap().is_empty());
}

#[test]
fn accounts_are_isolated_per_domain() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEntryRepository::try_new(&conn).unwrap();
    let config = SysdbConfig {
        db_path: None,
        domains: vec![DomainConfig::new("LOCAL"), DomainConfig::new("corp.example")],
    };
    let sysdb = SysdbService::try_new(repo, &config).unwrap();

    sysdb
        .store_account("LOCAL", &PosixAccountAttrs::new("alice", 1000, 1000))
        .unwrap();
    sysdb
        .store_account("corp.example", &PosixAccountAttrs::new("alice", 1000, 1000))
        .unwrap();

    assert_eq!(sysdb.list_accounts("LOCAL").unwrap().len(), 1);
    assert_eq!(sysdb.list_accounts("corp.example").unwrap().len(), 1);
    assert_eq!(
        sysdb.find_account_by_name("corp.example", "alice").unwrap().domain,
        "corp.example"
    );
    assert!(sysdb
        .repository()
        .get_entry(&entry_dn("corp.example", EntryKind::Account, "alice").unwrap())
        .unwrap()
        .is_some());
}

#[test]
fn serialized_account_omits_credential() {
    let conn = open_db_in_memory().unwrap();
    let sysdb = service(&conn);
    sysdb
        .store_account("LOCAL", &full_account("alice", 1000))
        .unwrap();

    let account = sysdb.find_account_by_name("LOCAL", "alice").unwrap();
    let json = serde_json::to_value(&account).unwrap();
    assert_eq!(json["name"], "alice");
    assert_eq!(json["uid"], 1000);
    assert_eq!(json["dn"], "name=alice,cn=users,cn=LOCAL,cn=sysdb");
    assert!(json.get("password").is_none());
    assert!(!json.to_string().contains("password"));
}
