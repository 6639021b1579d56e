//! In-process cluster double
//!
//! [`MemoryCluster`] keeps keyspaces, column families and rows in memory and
//! answers the driver seam the way a single Cassandra node would for the calls
//! the loaders make. Rows are ordered by raw key bytes (byte ordered
//! partitioner), columns by the column family comparator, sub columns by the
//! sub comparator. CQL is recognised for keyspace DDL, `USE`, `CREATE TABLE`
//! and `INSERT`; other well-formed statements are journaled and accepted.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use crate::driver::{identifier, CqlSession, DriverError, LegacyClient, Mutation};
use crate::embedded::{CassandraServer, ServerConfig};
use crate::error::Result;
use crate::model::{
    ClusterDescriptor, ColumnFamilyDefinition, ComparatorType, KeyspaceDefinition, MarshalType,
    StrategyModel,
};

const SYSTEM_KEYSPACES: [&str; 5] = [
    "system",
    "system_auth",
    "system_distributed",
    "system_schema",
    "system_traces",
];

const CQL_VERBS: [&str; 15] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "BEGIN", "APPLY", "CREATE", "ALTER", "DROP",
    "TRUNCATE", "USE", "GRANT", "REVOKE", "LIST", "DESCRIBE",
];

const IDENT: &str = r#"(?:"(?:[^"]|"")+"|\w+)"#;

fn pattern(template: &str, whole: bool) -> Regex {
    let body = template.replace("IDENT", IDENT);
    let source = if whole {
        format!(r"(?is)^\s*{}\s*$", body)
    } else {
        format!(r"(?is)^\s*{}", body)
    };
    Regex::new(&source).expect("statement pattern")
}

static DROP_KEYSPACE: Lazy<Regex> =
    Lazy::new(|| pattern(r"DROP\s+KEYSPACE\s+(?P<if>IF\s+EXISTS\s+)?(?P<ks>IDENT)", true));
static CREATE_KEYSPACE: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"CREATE\s+KEYSPACE\s+(?P<if>IF\s+NOT\s+EXISTS\s+)?(?P<ks>IDENT)\s+WITH\s+(?P<options>.*)",
        true,
    )
});
static USE_KEYSPACE: Lazy<Regex> = Lazy::new(|| pattern(r"USE\s+(?P<ks>IDENT)", true));
static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"CREATE\s+(?:TABLE|COLUMNFAMILY)\s+(?P<if>IF\s+NOT\s+EXISTS\s+)?(?:(?P<ks>IDENT)\.)?(?P<table>IDENT)\s*\(",
        false,
    )
});
static INSERT: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"INSERT\s+INTO\s+(?:(?P<ks>IDENT)\.)?(?P<table>IDENT)\s*\((?P<columns>[^)]*)\)\s*VALUES\s*\(",
        false,
    )
});
static SELECT_SCHEMA: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"SELECT\s+(?P<column>keyspace_name|table_name)\s+FROM\s+system_schema\.(?P<source>keyspaces|tables)(?:\s+WHERE\s+(?P<where>.*))?",
        true,
    )
});
static CONDITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?P<column>\w+)\s*=\s*'(?P<value>(?:[^']|'')*)'").expect("condition pattern"));
static REPLICATION_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'class'\s*:\s*'(?P<class>[^']+)'").expect("replication class pattern"));
static REPLICATION_FACTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'replication_factor'\s*:\s*'?(?P<rf>\d+)'?").expect("replication factor pattern")
});

/// One call observed by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Start,
    Clean,
    Connect(String),
    DropKeyspace(String),
    CreateKeyspace(String),
    Use(String),
    CreateTable { keyspace: String, table: String },
    Insert { keyspace: String, table: String },
    Increment { keyspace: String, table: String },
    Statement(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSnapshot {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl ColumnSnapshot {
    /// Counter or long value
    pub fn value_i64(&self) -> Option<i64> {
        <[u8; 8]>::try_from(self.value.as_slice()).ok().map(i64::from_be_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperColumnSnapshot {
    pub name: Vec<u8>,
    pub columns: Vec<ColumnSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSnapshot {
    pub key: Vec<u8>,
    pub columns: Vec<ColumnSnapshot>,
    pub super_columns: Vec<SuperColumnSnapshot>,
}

impl RowSnapshot {
    pub fn column(&self, name: &[u8]) -> Option<&ColumnSnapshot> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Schema and rows of a column family at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFamilySnapshot {
    pub definition: ColumnFamilyDefinition,
    pub rows: Vec<RowSnapshot>,
}

impl ColumnFamilySnapshot {
    pub fn row(&self, key: &[u8]) -> Option<&RowSnapshot> {
        self.rows.iter().find(|row| row.key == key)
    }
}

type Columns = Vec<(Vec<u8>, Vec<u8>)>;

#[derive(Debug, Default)]
struct RowState {
    columns: Columns,
    super_columns: Vec<(Vec<u8>, Columns)>,
}

#[derive(Debug)]
struct ColumnFamilyState {
    definition: ColumnFamilyDefinition,
    rows: BTreeMap<Vec<u8>, RowState>,
}

#[derive(Debug)]
struct CqlTable {
    columns: Vec<String>,
    primary_key: Vec<String>,
    rows: Vec<BTreeMap<String, String>>,
}

#[derive(Debug)]
struct KeyspaceState {
    definition: KeyspaceDefinition,
    column_families: BTreeMap<String, ColumnFamilyState>,
    tables: BTreeMap<String, CqlTable>,
}

impl KeyspaceState {
    fn new(definition: KeyspaceDefinition) -> Self {
        Self {
            definition,
            column_families: BTreeMap::new(),
            tables: BTreeMap::new(),
        }
    }

    fn has_table(&self, name: &str) -> bool {
        self.column_families.contains_key(name) || self.tables.contains_key(name)
    }
}

#[derive(Debug)]
struct State {
    keyspaces: BTreeMap<String, KeyspaceState>,
    journal: Vec<Operation>,
    starts: usize,
    connections: usize,
}

impl State {
    fn new() -> Self {
        let keyspaces = SYSTEM_KEYSPACES
            .iter()
            .map(|name| (name.to_string(), KeyspaceState::new(KeyspaceDefinition::new(*name))))
            .collect();
        Self {
            keyspaces,
            journal: Vec::new(),
            starts: 0,
            connections: 0,
        }
    }

    fn keyspace_mut(&mut self, keyspace: &str) -> std::result::Result<&mut KeyspaceState, DriverError> {
        self.keyspaces
            .get_mut(keyspace)
            .ok_or_else(|| DriverError::invalid_request(format!("Keyspace {} does not exist", keyspace)))
    }

    fn drop_keyspace(&mut self, keyspace: &str, if_exists: bool) -> std::result::Result<(), DriverError> {
        if self.keyspaces.remove(keyspace).is_none() && !if_exists {
            return Err(DriverError::invalid_request(format!(
                "Cannot drop non existing keyspace '{}'.",
                keyspace
            )));
        }
        self.journal.push(Operation::DropKeyspace(keyspace.to_string()));
        Ok(())
    }

    fn add_keyspace(
        &mut self,
        definition: KeyspaceDefinition,
        if_not_exists: bool,
    ) -> std::result::Result<(), DriverError> {
        if self.keyspaces.contains_key(&definition.name) {
            if if_not_exists {
                return Ok(());
            }
            return Err(DriverError::invalid_request(format!(
                "Cannot add existing keyspace \"{}\"",
                definition.name
            )));
        }
        self.journal.push(Operation::CreateKeyspace(definition.name.clone()));
        self.keyspaces
            .insert(definition.name.clone(), KeyspaceState::new(definition));
        Ok(())
    }
}

/// In-memory cluster shared by every session and client it hands out
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new())),
        }
    }

    /// A CQL session with no current keyspace
    pub fn session(&self) -> MemorySession {
        MemorySession {
            cluster: self.clone(),
            current: Mutex::new(None),
        }
    }

    pub fn keyspace_names(&self) -> Vec<String> {
        self.state.lock().keyspaces.keys().cloned().collect()
    }

    /// Keyspaces not prefixed with `system`
    pub fn user_keyspaces(&self) -> Vec<String> {
        self.keyspace_names()
            .into_iter()
            .filter(|name| !name.starts_with("system"))
            .collect()
    }

    pub fn describe_keyspace(&self, keyspace: &str) -> Option<KeyspaceDefinition> {
        self.state
            .lock()
            .keyspaces
            .get(keyspace)
            .map(|ks| ks.definition.clone())
    }

    pub fn column_family_names(&self, keyspace: &str) -> Vec<String> {
        self.state
            .lock()
            .keyspaces
            .get(keyspace)
            .map(|ks| ks.column_families.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn column_family(&self, keyspace: &str, column_family: &str) -> Option<ColumnFamilySnapshot> {
        let state = self.state.lock();
        let cf = state.keyspaces.get(keyspace)?.column_families.get(column_family)?;
        let snapshot_columns = |columns: &Columns| {
            columns
                .iter()
                .map(|(name, value)| ColumnSnapshot {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect::<Vec<_>>()
        };
        let rows = cf
            .rows
            .iter()
            .map(|(key, row)| RowSnapshot {
                key: key.clone(),
                columns: snapshot_columns(&row.columns),
                super_columns: row
                    .super_columns
                    .iter()
                    .map(|(name, columns)| SuperColumnSnapshot {
                        name: name.clone(),
                        columns: snapshot_columns(columns),
                    })
                    .collect(),
            })
            .collect();
        Some(ColumnFamilySnapshot {
            definition: cf.definition.clone(),
            rows,
        })
    }

    /// Tables created through CQL
    pub fn table_names(&self, keyspace: &str) -> Vec<String> {
        self.state
            .lock()
            .keyspaces
            .get(keyspace)
            .map(|ks| ks.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Rows inserted through CQL, column name to literal text
    pub fn table_rows(&self, keyspace: &str, table: &str) -> Vec<BTreeMap<String, String>> {
        self.state
            .lock()
            .keyspaces
            .get(keyspace)
            .and_then(|ks| ks.tables.get(table))
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    pub fn journal(&self) -> Vec<Operation> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().starts
    }

    /// Sessions and clients handed out so far
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections
    }

    fn connect(&self, cluster: &ClusterDescriptor) {
        let mut state = self.state.lock();
        state.connections += 1;
        state.journal.push(Operation::Connect(cluster.address()));
    }

    fn execute_in(&self, current: &Mutex<Option<String>>, statement: &str) -> std::result::Result<(), DriverError> {
        let statement = statement.trim().trim_end_matches(';').trim();
        let verb = statement
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if !CQL_VERBS.contains(&verb.as_str()) {
            return Err(DriverError::invalid_request(format!(
                "line 1:0 no viable alternative at input '{}'",
                statement.split_whitespace().next().unwrap_or_default()
            )));
        }

        let mut state = self.state.lock();

        if let Some(caps) = DROP_KEYSPACE.captures(statement) {
            let keyspace = identifier(&caps["ks"]);
            state.drop_keyspace(&keyspace, caps.name("if").is_some())?;
            let mut current = current.lock();
            if current.as_deref() == Some(keyspace.as_str()) {
                *current = None;
            }
            return Ok(());
        }

        if let Some(caps) = CREATE_KEYSPACE.captures(statement) {
            let definition = keyspace_definition(&identifier(&caps["ks"]), &caps["options"])?;
            return state.add_keyspace(definition, caps.name("if").is_some());
        }

        if let Some(caps) = USE_KEYSPACE.captures(statement) {
            let keyspace = identifier(&caps["ks"]);
            if !state.keyspaces.contains_key(&keyspace) {
                return Err(DriverError::invalid_request(format!(
                    "Keyspace '{}' does not exist",
                    keyspace
                )));
            }
            state.journal.push(Operation::Use(keyspace.clone()));
            *current.lock() = Some(keyspace);
            return Ok(());
        }

        if let Some(caps) = CREATE_TABLE.captures(statement) {
            let keyspace = target_keyspace(caps.name("ks").map(|m| m.as_str()), current)?;
            let table = identifier(&caps["table"]);
            let rest = &statement[caps.get(0).map(|m| m.end()).unwrap_or_default()..];
            let (body, _) = balanced(rest)
                .ok_or_else(|| DriverError::invalid_request("line 1:0 mismatched input: missing ')'"))?;
            let definition = table_definition(body)?;
            let if_not_exists = caps.name("if").is_some();

            let ks = state.keyspace_mut(&keyspace)?;
            if ks.has_table(&table) {
                if if_not_exists {
                    return Ok(());
                }
                return Err(DriverError::invalid_request(format!(
                    "Cannot add already existing table \"{}\" to keyspace \"{}\"",
                    table, keyspace
                )));
            }
            ks.tables.insert(table.clone(), definition);
            state.journal.push(Operation::CreateTable { keyspace, table });
            return Ok(());
        }

        if let Some(caps) = INSERT.captures(statement) {
            let keyspace = target_keyspace(caps.name("ks").map(|m| m.as_str()), current)?;
            let table_name = identifier(&caps["table"]);
            let rest = &statement[caps.get(0).map(|m| m.end()).unwrap_or_default()..];
            let (values, _) = balanced(rest)
                .ok_or_else(|| DriverError::invalid_request("line 1:0 mismatched input: missing ')'"))?;
            let columns: Vec<String> = split_top_level(&caps["columns"])
                .iter()
                .map(|c| identifier(c))
                .collect();
            let values = split_top_level(values);
            if columns.len() != values.len() {
                return Err(DriverError::invalid_request("Unmatched column names/values"));
            }

            let ks = state.keyspace_mut(&keyspace)?;
            let table = ks.tables.get_mut(&table_name).ok_or_else(|| {
                DriverError::invalid_request(format!("unconfigured table {}", table_name))
            })?;
            if let Some(unknown) = columns.iter().find(|c| !table.columns.contains(c)) {
                return Err(DriverError::invalid_request(format!(
                    "Undefined column name {}",
                    unknown
                )));
            }
            let row: BTreeMap<String, String> = columns
                .into_iter()
                .zip(values.iter().map(|v| unquote(v)))
                .collect();
            if let Some(missing) = table.primary_key.iter().find(|c| !row.contains_key(*c)) {
                return Err(DriverError::invalid_request(format!(
                    "Some partition key parts are missing: {}",
                    missing
                )));
            }
            table.upsert(row);
            state.journal.push(Operation::Insert {
                keyspace,
                table: table_name,
            });
            return Ok(());
        }

        state.journal.push(Operation::Statement(statement.to_string()));
        Ok(())
    }

    /// Schema listings from `system_schema`; any other statement is executed and returns no rows
    fn query_in(
        &self,
        current: &Mutex<Option<String>>,
        statement: &str,
    ) -> std::result::Result<Vec<Vec<String>>, DriverError> {
        let statement = statement.trim().trim_end_matches(';').trim();
        let caps = match SELECT_SCHEMA.captures(statement) {
            Some(caps) => caps,
            None => {
                self.execute_in(current, statement)?;
                return Ok(Vec::new());
            }
        };
        let mut filters = BTreeMap::new();
        if let Some(conditions) = caps.name("where") {
            for condition in CONDITION.captures_iter(conditions.as_str()) {
                filters.insert(
                    condition["column"].to_ascii_lowercase(),
                    condition["value"].replace("''", "'"),
                );
            }
        }
        let matches = |column: &str, value: &str| filters.get(column).map_or(true, |f| f == value);

        let state = self.state.lock();
        let mut rows = Vec::new();
        for (name, keyspace) in state.keyspaces.iter().filter(|(name, _)| matches("keyspace_name", name)) {
            if &caps["source"] == "keyspaces" {
                rows.push(vec![name.clone()]);
                continue;
            }
            let tables = keyspace.column_families.keys().chain(keyspace.tables.keys());
            for table in tables.filter(|table| matches("table_name", table)) {
                let cell = if &caps["column"] == "table_name" { table } else { name };
                rows.push(vec![cell.clone()]);
            }
        }
        Ok(rows)
    }

    fn mutate(&self, keyspace: &str, mutation: Mutation) -> std::result::Result<(), DriverError> {
        let mut state = self.state.lock();
        let ks = state.keyspace_mut(keyspace)?;
        let cf = ks
            .column_families
            .get_mut(mutation.column_family())
            .ok_or_else(|| {
                DriverError::invalid_request(format!(
                    "unconfigured columnfamily {}",
                    mutation.column_family()
                ))
            })?;
        let operation = cf.apply(mutation, keyspace)?;
        state.journal.push(operation);
        Ok(())
    }
}

impl CqlTable {
    fn upsert(&mut self, row: BTreeMap<String, String>) {
        let same_key = |existing: &BTreeMap<String, String>| {
            self.primary_key.iter().all(|c| existing.get(c) == row.get(c))
        };
        match self.rows.iter().position(same_key) {
            Some(index) => self.rows[index].extend(row),
            None => self.rows.push(row),
        }
    }
}

impl ColumnFamilyState {
    fn apply(&mut self, mutation: Mutation, keyspace: &str) -> std::result::Result<Operation, DriverError> {
        let definition = &self.definition;
        let table = definition.name.clone();
        let (key, super_column, name, increment, value) = match mutation {
            Mutation::Insert {
                key,
                super_column,
                name,
                value,
                ..
            } => {
                if definition.is_counter() {
                    return Err(DriverError::invalid_request(
                        "Cannot add a non counter column to a counter column family",
                    ));
                }
                (key, super_column, name, None, Some(value))
            }
            Mutation::Increment {
                key,
                super_column,
                name,
                delta,
                ..
            } => {
                if !definition.is_counter() {
                    return Err(DriverError::invalid_request(format!(
                        "Cannot add a counter column ({}) in non counter column family {}",
                        name, table
                    )));
                }
                (key, super_column, name, Some(delta), None)
            }
        };

        validate_bytes(&definition.key_type, key.bytes(), "key")?;
        let (name_comparator, super_comparator) = match (&super_column, definition.is_super()) {
            (Some(_), false) => {
                return Err(DriverError::invalid_request(format!(
                    "supercolumn parameter is invalid for standard CF {}",
                    table
                )))
            }
            (None, true) => {
                return Err(DriverError::invalid_request(format!(
                    "supercolumn parameter is not optional for super CF {}",
                    table
                )))
            }
            (Some(_), true) => (definition.sub_comparator(), Some(definition.comparator_type.clone())),
            (None, false) => (definition.comparator_type.clone(), None),
        };
        validate_bytes(&name_comparator, name.bytes(), "column name")?;
        if let Some(value) = &value {
            validate_bytes(definition.validator_for(name.bytes()), value.bytes(), "column value")?;
        }
        if let (Some(super_name), Some(comparator)) = (&super_column, &super_comparator) {
            validate_bytes(comparator, super_name.bytes(), "super column name")?;
        }

        let row = self.rows.entry(key.into_bytes()).or_default();
        let columns = match (super_column, super_comparator) {
            (Some(super_name), Some(comparator)) => {
                let super_name = super_name.into_bytes();
                let index = match row
                    .super_columns
                    .binary_search_by(|(existing, _)| comparator.compare(existing, &super_name))
                {
                    Ok(index) => index,
                    Err(index) => {
                        row.super_columns.insert(index, (super_name, Vec::new()));
                        index
                    }
                };
                &mut row.super_columns[index].1
            }
            _ => &mut row.columns,
        };

        let name = name.into_bytes();
        let position = columns.binary_search_by(|(existing, _)| name_comparator.compare(existing, &name));
        match (increment, value) {
            (Some(delta), _) => {
                let current = match position {
                    Ok(index) => <[u8; 8]>::try_from(columns[index].1.as_slice())
                        .map(i64::from_be_bytes)
                        .unwrap_or_default(),
                    Err(_) => 0,
                };
                let updated = current.wrapping_add(delta).to_be_bytes().to_vec();
                match position {
                    Ok(index) => columns[index].1 = updated,
                    Err(index) => columns.insert(index, (name, updated)),
                }
                Ok(Operation::Increment {
                    keyspace: keyspace.to_string(),
                    table,
                })
            }
            (None, value) => {
                let value = value.map(|v| v.into_bytes()).unwrap_or_default();
                match position {
                    Ok(index) => columns[index].1 = value,
                    Err(index) => columns.insert(index, (name, value)),
                }
                Ok(Operation::Insert {
                    keyspace: keyspace.to_string(),
                    table,
                })
            }
        }
    }
}

/// CQL session over a [`MemoryCluster`], tracking its current keyspace
#[derive(Debug)]
pub struct MemorySession {
    cluster: MemoryCluster,
    current: Mutex<Option<String>>,
}

impl MemorySession {
    pub fn current_keyspace(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl CqlSession for MemorySession {
    async fn execute(&self, statement: &str) -> std::result::Result<(), DriverError> {
        log::trace!("memory cluster executing: {}", statement);
        self.cluster.execute_in(&self.current, statement)
    }

    async fn query(&self, statement: &str) -> std::result::Result<Vec<Vec<String>>, DriverError> {
        log::trace!("memory cluster querying: {}", statement);
        self.cluster.query_in(&self.current, statement)
    }
}

#[async_trait]
impl LegacyClient for MemoryCluster {
    async fn keyspace_exists(&self, keyspace: &str) -> std::result::Result<bool, DriverError> {
        Ok(self.state.lock().keyspaces.contains_key(keyspace))
    }

    async fn column_family_exists(
        &self,
        keyspace: &str,
        column_family: &str,
    ) -> std::result::Result<bool, DriverError> {
        Ok(self
            .state
            .lock()
            .keyspaces
            .get(keyspace)
            .map(|ks| ks.has_table(column_family))
            .unwrap_or(false))
    }

    async fn drop_keyspace(&self, keyspace: &str) -> std::result::Result<(), DriverError> {
        self.state.lock().drop_keyspace(keyspace, false)
    }

    async fn add_keyspace(&self, definition: &KeyspaceDefinition) -> std::result::Result<(), DriverError> {
        self.state.lock().add_keyspace(definition.clone(), false)
    }

    async fn add_column_family(
        &self,
        keyspace: &str,
        definition: &ColumnFamilyDefinition,
    ) -> std::result::Result<(), DriverError> {
        let mut state = self.state.lock();
        let ks = state.keyspace_mut(keyspace)?;
        if ks.has_table(&definition.name) {
            return Err(DriverError::invalid_request(format!(
                "Cannot add already existing column family \"{}\" to keyspace \"{}\"",
                definition.name, keyspace
            )));
        }
        ks.column_families.insert(
            definition.name.clone(),
            ColumnFamilyState {
                definition: definition.clone(),
                rows: BTreeMap::new(),
            },
        );
        state.journal.push(Operation::CreateTable {
            keyspace: keyspace.to_string(),
            table: definition.name.clone(),
        });
        Ok(())
    }

    async fn apply(&self, keyspace: &str, mutation: Mutation) -> std::result::Result<(), DriverError> {
        self.mutate(keyspace, mutation)
    }
}

#[async_trait]
impl CassandraServer for MemoryCluster {
    async fn start(&self, config: &ServerConfig) -> Result<()> {
        let mut state = self.state.lock();
        state.starts += 1;
        state.journal.push(Operation::Start);
        log::debug!(
            "memory cluster started (configuration {})",
            config.configuration_file.display()
        );
        Ok(())
    }

    async fn clean(&self) -> Result<()> {
        let mut state = self.state.lock();
        let user: Vec<String> = state
            .keyspaces
            .keys()
            .filter(|name| !name.starts_with("system"))
            .cloned()
            .collect();
        for keyspace in user {
            state.drop_keyspace(&keyspace, true)?;
        }
        state.journal.push(Operation::Clean);
        Ok(())
    }

    async fn cql_session(&self, cluster: &ClusterDescriptor) -> Result<Box<dyn CqlSession>> {
        self.connect(cluster);
        Ok(Box::new(self.session()))
    }

    async fn legacy_client(&self, cluster: &ClusterDescriptor) -> Result<Box<dyn LegacyClient>> {
        self.connect(cluster);
        Ok(Box::new(self.clone()))
    }
}

fn target_keyspace(
    explicit: Option<&str>,
    current: &Mutex<Option<String>>,
) -> std::result::Result<String, DriverError> {
    match explicit {
        Some(keyspace) => Ok(identifier(keyspace)),
        None => current.lock().clone().ok_or_else(|| {
            DriverError::invalid_request(
                "No keyspace has been specified. USE a keyspace, or explicitly specify keyspace.tablename",
            )
        }),
    }
}

fn keyspace_definition(name: &str, options: &str) -> std::result::Result<KeyspaceDefinition, DriverError> {
    let mut definition = KeyspaceDefinition::new(name);
    if let Some(caps) = REPLICATION_CLASS.captures(options) {
        definition.strategy = caps["class"].parse::<StrategyModel>().map_err(|_| {
            DriverError::invalid_request(format!(
                "Unable to find replication strategy class '{}'",
                &caps["class"]
            ))
        })?;
    }
    if let Some(caps) = REPLICATION_FACTOR.captures(options) {
        definition.replication_factor = caps["rf"].parse().unwrap_or(1);
    }
    Ok(definition)
}

fn table_definition(body: &str) -> std::result::Result<CqlTable, DriverError> {
    let mut columns = Vec::new();
    let mut primary_key = Vec::new();
    for part in split_top_level(body) {
        let upper = part.to_ascii_uppercase();
        if upper.starts_with("PRIMARY") {
            let open = part.find('(').unwrap_or(part.len());
            primary_key = part[open..]
                .split(|c: char| c == ',' || c == '(' || c == ')')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(identifier)
                .collect();
            continue;
        }
        let name = part
            .split_whitespace()
            .next()
            .ok_or_else(|| DriverError::invalid_request("line 1:0 empty column definition"))?;
        let name = identifier(name);
        if upper.contains("PRIMARY KEY") {
            primary_key = vec![name.clone()];
        }
        columns.push(name);
    }
    if primary_key.is_empty() {
        return Err(DriverError::invalid_request("No PRIMARY KEY specifed (exactly one required)"));
    }
    Ok(CqlTable {
        columns,
        primary_key,
        rows: Vec::new(),
    })
}

/// Content up to the `)` closing an already opened parenthesis, and the rest
fn balanced(input: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') if depth == 0 => return Some((&input[..i], &input[i + 1..])),
            (None, ')') => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Split on commas outside quotes and brackets
fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') | (None, '[') | (None, '{') | (None, '<') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') | (None, ']') | (None, '}') | (None, '>') => {
                depth -= 1;
                current.push(c);
            }
            (None, ',') if depth == 0 => parts.push(std::mem::take(&mut current).trim().to_string()),
            (None, c) => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn unquote(literal: &str) -> String {
    match literal.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => literal.to_string(),
    }
}

/// Byte validation of a declared type, with Cassandra's messages
fn validate_bytes(declared: &ComparatorType, bytes: &[u8], position: &str) -> std::result::Result<(), DriverError> {
    let marshal = match declared.marshal() {
        Some(marshal) => marshal,
        None => return Ok(()),
    };
    let error = match marshal {
        MarshalType::Long | MarshalType::Counter if !matches!(bytes.len(), 0 | 8) => {
            Some(format!("Expected 8 or 0 byte long ({})", bytes.len()))
        }
        MarshalType::Int32 if !matches!(bytes.len(), 0 | 4) => {
            Some(format!("Expected 4 or 0 byte int ({})", bytes.len()))
        }
        MarshalType::Uuid | MarshalType::TimeUuid | MarshalType::LexicalUuid
            if !matches!(bytes.len(), 0 | 16) =>
        {
            Some(format!("UUID should be 16 or 0 bytes ({})", bytes.len()))
        }
        MarshalType::Boolean if bytes.len() > 1 => {
            Some(format!("Expected 1 or 0 byte value ({})", bytes.len()))
        }
        MarshalType::Ascii if !bytes.is_ascii() => Some("Invalid byte for ascii".to_string()),
        MarshalType::Utf8 if std::str::from_utf8(bytes).is_err() => {
            Some("String didn't validate.".to_string())
        }
        _ => None,
    };
    match error {
        Some(message) => Err(DriverError::invalid_request(format!(
            "[{}] {}",
            position, message
        ))),
        None => Ok(()),
    }
}
