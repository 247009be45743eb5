//! DN-addressed entry storage on SQLite.
//!
//! # Responsibility
//! - Store hierarchical entries with multi-valued attributes.
//! - Answer scoped, attribute-filtered searches.
//! - Apply batches of mutations atomically, optionally interleaved with
//!   reads that decide what to write.
//!
//! # Invariants
//! - An entry can only be added below an existing parent (the top-level
//!   entry excepted).
//! - Attribute values form a set per `(dn, attr)`; insertion order is kept.
//! - A mutation batch either commits completely or leaves no trace.
//! - The naming (RDN) value of an entry cannot be removed.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::dn::{is_valid_attribute_name, Dn};
use crate::model::entry::{Attributes, Entry};
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// Entry repository error.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// `Add` targeted a DN that already exists.
    EntryAlreadyExists(Dn),
    /// Modification targeted a DN that does not exist.
    NoSuchEntry(Dn),
    /// `Add` targeted a DN whose parent does not exist.
    NoSuchParent(Dn),
    /// Attribute name is not usable.
    InvalidAttribute(String),
    /// Modification would drop the entry's naming value.
    NamingViolation { dn: Dn, attribute: String },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be decoded.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::EntryAlreadyExists(dn) => write!(f, "entry already exists: {dn}"),
            Self::NoSuchEntry(dn) => write!(f, "no such entry: {dn}"),
            Self::NoSuchParent(dn) => write!(f, "parent entry does not exist: {dn}"),
            Self::InvalidAttribute(attr) => write!(f, "invalid attribute name `{attr}`"),
            Self::NamingViolation { dn, attribute } => {
                write!(f, "cannot remove naming attribute `{attribute}` of {dn}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "entry repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "entry repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "entry repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted entry data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Which entries relative to the search base are candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The base entry only.
    Base,
    /// Direct children of the base, excluding the base.
    OneLevel,
    /// The base and all of its descendants.
    Subtree,
}

/// Attribute filter evaluated against candidate entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Some value of `attr` equals `value` exactly.
    Equality { attr: String, value: String },
    /// `attr` has at least one value.
    Present(String),
    /// All inner filters match. An empty list matches everything.
    And(Vec<Filter>),
}

impl Filter {
    pub fn equality(attr: impl Into<String>, value: impl ToString) -> Self {
        Self::Equality {
            attr: attr.into(),
            value: value.to_string(),
        }
    }

    pub fn present(attr: impl Into<String>) -> Self {
        Self::Present(attr.into())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }
}

/// Scoped search over the entry tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: Dn,
    pub scope: SearchScope,
    pub filter: Option<Filter>,
    /// Attributes to return; empty means all.
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn new(base: Dn, scope: SearchScope) -> Self {
        Self {
            base,
            scope,
            filter: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|attr| attr.to_string()).collect();
        self
    }
}

/// One write inside a mutation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create a new entry. The naming value is added when missing.
    Add { dn: Dn, attributes: Attributes },
    /// Replace every value of one attribute. Empty `values` removes it.
    Replace {
        dn: Dn,
        attribute: String,
        values: Vec<String>,
    },
    /// Add values to one attribute, skipping those already present.
    AddValues {
        dn: Dn,
        attribute: String,
        values: Vec<String>,
    },
}

impl Mutation {
    pub fn dn(&self) -> &Dn {
        match self {
            Self::Add { dn, .. } | Self::Replace { dn, .. } | Self::AddValues { dn, .. } => dn,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Replace { .. } => "replace",
            Self::AddValues { .. } => "add_values",
        }
    }
}

/// Reads and writes issued inside one open write transaction.
pub trait EntryStore {
    /// Runs a scoped search against the transaction's view.
    fn search(&self, request: &SearchRequest) -> RepoResult<Vec<Entry>>;
    /// Applies one mutation; nothing is visible outside until commit.
    fn apply(&self, mutation: &Mutation) -> RepoResult<()>;

    /// Loads one entry by exact DN.
    fn get_entry(&self, dn: &Dn) -> RepoResult<Option<Entry>> {
        let request = SearchRequest::new(dn.clone(), SearchScope::Base);
        Ok(self.search(&request)?.into_iter().next())
    }
}

/// Storage engine contract consumed by the sysdb service.
pub trait EntryRepository {
    /// Runs a scoped search. Results are ordered by DN.
    fn search(&self, request: &SearchRequest) -> RepoResult<Vec<Entry>>;

    /// Runs `work` inside one write transaction that holds the write lock
    /// from its first read.
    ///
    /// The outer `Err` reports begin/commit failures. The inner result is
    /// `work`'s own; the transaction commits only when it is `Ok`.
    fn transaction_with<T, E, F>(&self, work: F) -> RepoResult<Result<T, E>>
    where
        F: FnOnce(&dyn EntryStore) -> Result<T, E>;

    /// Applies all mutations in one transaction.
    fn transaction(&self, mutations: &[Mutation]) -> RepoResult<()> {
        self.transaction_with(|store| {
            mutations
                .iter()
                .try_for_each(|mutation| store.apply(mutation))
        })?
    }

    /// Loads one entry by exact DN.
    fn get_entry(&self, dn: &Dn) -> RepoResult<Option<Entry>> {
        let request = SearchRequest::new(dn.clone(), SearchScope::Base);
        Ok(self.search(&request)?.into_iter().next())
    }
}

/// SQLite-backed entry repository.
pub struct SqliteEntryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntryRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_entry_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn search(&self, request: &SearchRequest) -> RepoResult<Vec<Entry>> {
        // Deferred read transaction keeps the dn scan and value loads on one snapshot.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let entries = search_entries(&tx, request)?;
        tx.commit()?;
        Ok(entries)
    }

    fn transaction_with<T, E, F>(&self, work: F) -> RepoResult<Result<T, E>>
    where
        F: FnOnce(&dyn EntryStore) -> Result<T, E>,
    {
        let started_at = Instant::now();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let result = {
            let store = SqliteEntryStore { conn: &tx };
            work(&store)
        };

        if result.is_err() {
            // Dropping `tx` rolls back every write made by `work`.
            debug!(
                "event=entry_transaction module=repo status=rolled_back duration_ms={}",
                started_at.elapsed().as_millis()
            );
            return Ok(result);
        }
        tx.commit()?;

        debug!(
            "event=entry_transaction module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(result)
    }
}

/// Store view bound to an open SQLite transaction.
struct SqliteEntryStore<'tx> {
    conn: &'tx Connection,
}

impl EntryStore for SqliteEntryStore<'_> {
    fn search(&self, request: &SearchRequest) -> RepoResult<Vec<Entry>> {
        search_entries(self.conn, request)
    }

    fn apply(&self, mutation: &Mutation) -> RepoResult<()> {
        apply_mutation(self.conn, mutation).inspect_err(|err| {
            warn!(
                "event=entry_mutation module=repo status=error op={} error={}",
                mutation.kind(),
                err
            );
        })
    }
}

fn search_entries(conn: &Connection, request: &SearchRequest) -> RepoResult<Vec<Entry>> {
    let mut sql = match request.scope {
        SearchScope::Base => "SELECT e.dn FROM entries e WHERE e.dn = ?".to_string(),
        SearchScope::OneLevel => "SELECT e.dn FROM entries e WHERE e.parent_dn = ?".to_string(),
        SearchScope::Subtree => "WITH RECURSIVE subtree(dn) AS (
                SELECT dn FROM entries WHERE dn = ?
                UNION ALL
                SELECT child.dn
                FROM entries child
                INNER JOIN subtree parent ON child.parent_dn = parent.dn
            )
            SELECT e.dn FROM entries e
            INNER JOIN subtree s ON s.dn = e.dn
            WHERE 1 = 1"
            .to_string(),
    };
    let mut bind_values = vec![Value::Text(request.base.to_string())];

    if let Some(filter) = &request.filter {
        sql.push_str(" AND ");
        push_filter_sql(filter, &mut sql, &mut bind_values);
    }
    sql.push_str(" ORDER BY e.dn ASC;");

    let mut dns = Vec::new();
    {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        while let Some(row) = rows.next()? {
            dns.push(row.get::<_, String>(0)?);
        }
    }

    let mut entries = Vec::with_capacity(dns.len());
    for dn_text in dns {
        let dn = Dn::parse(&dn_text).map_err(|err| {
            RepoError::InvalidData(format!("invalid dn `{dn_text}` in entries.dn: {err}"))
        })?;
        let attributes = load_attributes(conn, &dn_text, &request.attributes)?;
        entries.push(Entry { dn, attributes });
    }

    debug!(
        "event=entry_search module=repo status=ok scope={:?} matches={}",
        request.scope,
        entries.len()
    );
    Ok(entries)
}

fn push_filter_sql(filter: &Filter, sql: &mut String, bind_values: &mut Vec<Value>) {
    match filter {
        Filter::Equality { attr, value } => {
            sql.push_str(
                "EXISTS(
                    SELECT 1 FROM entry_values v
                    WHERE v.dn = e.dn AND v.attr = ? AND v.value = ?
                )",
            );
            bind_values.push(Value::Text(attr.clone()));
            bind_values.push(Value::Text(value.clone()));
        }
        Filter::Present(attr) => {
            sql.push_str(
                "EXISTS(
                    SELECT 1 FROM entry_values v
                    WHERE v.dn = e.dn AND v.attr = ?
                )",
            );
            bind_values.push(Value::Text(attr.clone()));
        }
        Filter::And(filters) if filters.is_empty() => sql.push_str("1 = 1"),
        Filter::And(filters) => {
            sql.push('(');
            for (index, inner) in filters.iter().enumerate() {
                if index > 0 {
                    sql.push_str(" AND ");
                }
                push_filter_sql(inner, sql, bind_values);
            }
            sql.push(')');
        }
    }
}

fn load_attributes(conn: &Connection, dn: &str, wanted: &[String]) -> RepoResult<Attributes> {
    let mut stmt = conn.prepare_cached(
        "SELECT attr, value
         FROM entry_values
         WHERE dn = ?1
         ORDER BY attr ASC, ordinal ASC;",
    )?;
    let mut rows = stmt.query([dn])?;
    let mut attributes = Attributes::new();
    while let Some(row) = rows.next()? {
        let attr: String = row.get(0)?;
        if !wanted.is_empty() && !wanted.iter().any(|name| *name == attr) {
            continue;
        }
        attributes.entry(attr).or_default().push(row.get(1)?);
    }
    Ok(attributes)
}

fn apply_mutation(conn: &Connection, mutation: &Mutation) -> RepoResult<()> {
    match mutation {
        Mutation::Add { dn, attributes } => add_entry(conn, dn, attributes),
        Mutation::Replace {
            dn,
            attribute,
            values,
        } => replace_values(conn, dn, attribute, values),
        Mutation::AddValues {
            dn,
            attribute,
            values,
        } => add_values(conn, dn, attribute, values),
    }
}

fn add_entry(conn: &Connection, dn: &Dn, attributes: &Attributes) -> RepoResult<()> {
    for attr in attributes.keys() {
        ensure_attribute_name(attr)?;
    }

    let dn_text = dn.to_string();
    if entry_exists(conn, &dn_text)? {
        return Err(RepoError::EntryAlreadyExists(dn.clone()));
    }

    let parent_text = match dn.parent() {
        Some(parent) => {
            let parent_text = parent.to_string();
            if !entry_exists(conn, &parent_text)? {
                return Err(RepoError::NoSuchParent(parent));
            }
            Some(parent_text)
        }
        None => None,
    };

    conn.execute(
        "INSERT INTO entries (dn, parent_dn) VALUES (?1, ?2);",
        params![dn_text, parent_text],
    )?;

    for (attr, values) in attributes {
        insert_values(conn, &dn_text, attr, values, 0)?;
    }

    let rdn = dn.rdn();
    let has_naming_value = attributes
        .get(rdn.attr())
        .is_some_and(|values| values.iter().any(|value| value == rdn.value()));
    if !has_naming_value {
        let ordinal = next_ordinal(conn, &dn_text, rdn.attr())?;
        insert_values(conn, &dn_text, rdn.attr(), &[rdn.value().to_string()], ordinal)?;
    }
    Ok(())
}

fn replace_values(
    conn: &Connection,
    dn: &Dn,
    attribute: &str,
    values: &[String],
) -> RepoResult<()> {
    ensure_attribute_name(attribute)?;
    let dn_text = dn.to_string();
    if !entry_exists(conn, &dn_text)? {
        return Err(RepoError::NoSuchEntry(dn.clone()));
    }

    let rdn = dn.rdn();
    if rdn.attr() == attribute && !values.iter().any(|value| value == rdn.value()) {
        return Err(RepoError::NamingViolation {
            dn: dn.clone(),
            attribute: attribute.to_string(),
        });
    }

    conn.execute(
        "DELETE FROM entry_values WHERE dn = ?1 AND attr = ?2;",
        params![dn_text, attribute],
    )?;
    insert_values(conn, &dn_text, attribute, values, 0)?;
    touch_entry(conn, &dn_text)
}

fn add_values(conn: &Connection, dn: &Dn, attribute: &str, values: &[String]) -> RepoResult<()> {
    ensure_attribute_name(attribute)?;
    let dn_text = dn.to_string();
    if !entry_exists(conn, &dn_text)? {
        return Err(RepoError::NoSuchEntry(dn.clone()));
    }

    let ordinal = next_ordinal(conn, &dn_text, attribute)?;
    insert_values(conn, &dn_text, attribute, values, ordinal)?;
    touch_entry(conn, &dn_text)
}

/// Inserts values not yet present; returns how many were new.
fn insert_values(
    conn: &Connection,
    dn: &str,
    attribute: &str,
    values: &[String],
    first_ordinal: i64,
) -> RepoResult<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO entry_values (dn, attr, value, ordinal)
         VALUES (?1, ?2, ?3, ?4);",
    )?;
    let mut ordinal = first_ordinal;
    let mut inserted = 0;
    for value in values {
        if stmt.execute(params![dn, attribute, value, ordinal])? == 1 {
            ordinal += 1;
            inserted += 1;
        }
    }
    Ok(inserted)
}

fn next_ordinal(conn: &Connection, dn: &str, attribute: &str) -> RepoResult<i64> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(ordinal), -1) + 1
         FROM entry_values
         WHERE dn = ?1 AND attr = ?2;",
        params![dn, attribute],
        |row| row.get(0),
    )?;
    Ok(next)
}

fn touch_entry(conn: &Connection, dn: &str) -> RepoResult<()> {
    conn.execute(
        "UPDATE entries
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE dn = ?1;",
        [dn],
    )?;
    Ok(())
}

fn entry_exists(conn: &Connection, dn: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entries WHERE dn = ?1);",
        [dn],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_attribute_name(attr: &str) -> RepoResult<()> {
    if !is_valid_attribute_name(attr) {
        return Err(RepoError::InvalidAttribute(attr.to_string()));
    }
    Ok(())
}

fn ensure_entry_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    const REQUIRED: &[(&str, &[&str])] = &[
        ("entries", &["dn", "parent_dn", "created_at", "updated_at"]),
        ("entry_values", &["dn", "attr", "value", "ordinal"]),
    ];
    for &(table, columns) in REQUIRED {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
