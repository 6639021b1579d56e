//! cqlsh-backed driver
//!
//! Statements run through `docker exec <container> cqlsh -e ...` against a
//! Cassandra container. cqlsh has no session state between invocations, so
//! `USE` is tracked here and passed back with `-k`. [`CqlLegacyClient`]
//! expresses the legacy column family model as CQL tables on top of any
//! [`CqlSession`].

use std::collections::HashMap;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::process::Command;

use crate::driver::{identifier, quote_identifier, CqlSession, DriverError, LegacyClient, Mutation};
use crate::model::comparator::varint_to_i128;
use crate::model::{
    ColumnFamilyDefinition, ComparatorType, KeyspaceDefinition, MarshalType, StrategyModel, Value,
};

static USE_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)^\s*USE\s+("(?:[^"]|"")+"|\w+)\s*;?\s*$"#).expect("use pattern"));
static SERVER_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"message="(?P<message>[^"]*)""#).expect("message pattern"));

/// Run `docker` with the given arguments, bounded by `timeout`
pub(crate) async fn docker(args: &[String], timeout: Duration) -> Result<Output, DriverError> {
    log::debug!("docker {}", args.join(" "));
    let mut command = Command::new("docker");
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(DriverError::connection(format!("failed to execute docker: {}", e))),
        Err(_) => Err(DriverError::Timeout(format!(
            "docker {} did not complete within {:?}",
            args.first().map(String::as_str).unwrap_or_default(),
            timeout
        ))),
    }
}

/// Map cqlsh stderr to a driver error
pub fn classify_error(stderr: &str) -> DriverError {
    let text = stderr.trim();
    let lower = text.to_ascii_lowercase();
    if lower.contains("unable to connect")
        || lower.contains("connection refused")
        || lower.contains("nohostavailable")
        || lower.contains("no such container")
        || lower.contains("is not running")
    {
        return DriverError::connection(text);
    }
    if lower.contains("operationtimedout") || lower.contains("timed out") || lower.contains("timeout") {
        return DriverError::Timeout(text.to_string());
    }
    let message = SERVER_MESSAGE
        .captures(text)
        .map(|caps| caps["message"].to_string())
        .unwrap_or_else(|| text.to_string());
    DriverError::invalid_request(message)
}

/// Table printed by cqlsh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CqlshOutput {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse cqlsh's table output: header, dashed separator, rows, `(n rows)`
pub fn parse_cqlsh_output(output: &str) -> CqlshOutput {
    let lines: Vec<&str> = output.lines().collect();
    let separator = lines.iter().position(|line| {
        line.contains("---") && line.chars().all(|c| c == '-' || c == '+' || c.is_whitespace())
    });

    let separator = match separator {
        Some(index) if index > 0 => index,
        _ => return CqlshOutput::default(),
    };

    let headers = parse_row(lines[separator - 1]);
    let rows = lines[separator + 1..]
        .iter()
        .take_while(|line| !line.trim_start().starts_with('(') || !line.contains(" row"))
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with("Warning"))
        .map(|line| parse_row(line))
        .collect();
    CqlshOutput { headers, rows }
}

fn parse_row(line: &str) -> Vec<String> {
    line.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// CQL session running each statement through cqlsh in a container
#[derive(Debug)]
pub struct CqlshSession {
    container: String,
    timeout: Duration,
    keyspace: Mutex<Option<String>>,
}

impl CqlshSession {
    pub fn new(container: impl Into<String>, timeout: Duration) -> Self {
        Self {
            container: container.into(),
            timeout,
            keyspace: Mutex::new(None),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Keyspace selected by the last successful `USE`
    pub fn keyspace(&self) -> Option<String> {
        self.keyspace.lock().clone()
    }

    /// `docker` arguments running `statement`
    pub fn command_args(&self, statement: &str) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            self.container.clone(),
            "cqlsh".to_string(),
            "--request-timeout".to_string(),
            self.timeout.as_secs().max(1).to_string(),
        ];
        if let Some(keyspace) = self.keyspace() {
            args.push("-k".to_string());
            args.push(keyspace);
        }
        args.push("-e".to_string());
        args.push(format!("{};", statement.trim().trim_end_matches(';')));
        args
    }

    /// Run a statement and return cqlsh's stdout
    pub async fn run(&self, statement: &str) -> Result<String, DriverError> {
        let output = docker(&self.command_args(statement), self.timeout).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || stderr.contains("Error from server") {
            log::debug!("cqlsh failed for '{}': {}", statement, stderr.trim());
            return Err(classify_error(&stderr));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl CqlSession for CqlshSession {
    async fn execute(&self, statement: &str) -> Result<(), DriverError> {
        self.run(statement).await?;
        if let Some(caps) = USE_STATEMENT.captures(statement) {
            let keyspace = identifier(&caps[1]);
            log::debug!("cqlsh session now using keyspace {}", keyspace);
            *self.keyspace.lock() = Some(keyspace);
        }
        Ok(())
    }

    async fn query(&self, statement: &str) -> Result<Vec<Vec<String>>, DriverError> {
        let stdout = self.run(statement).await?;
        Ok(parse_cqlsh_output(&stdout).rows)
    }
}

/// Shape of the CQL table standing in for a column family
#[derive(Debug, Clone, PartialEq)]
struct TableLayout {
    key: Option<MarshalType>,
    clustering: Vec<Option<MarshalType>>,
    value: Option<MarshalType>,
}

impl TableLayout {
    fn of(definition: &ColumnFamilyDefinition) -> Self {
        let clustering = if definition.is_super() {
            vec![
                definition.comparator_type.marshal(),
                definition.sub_comparator().marshal(),
            ]
        } else {
            definition
                .comparator_type
                .components()
                .iter()
                .map(ComparatorType::marshal)
                .collect()
        };
        Self {
            key: definition.key_type.marshal(),
            clustering,
            value: value_column_type(definition),
        }
    }
}

/// Single CQL type for the value column, `None` meaning blob
fn value_column_type(definition: &ColumnFamilyDefinition) -> Option<MarshalType> {
    let default = definition.default_column_value_type.marshal();
    let shared = definition.column_metadata.iter().all(|metadata| {
        metadata.validation_class.marshal().map(MarshalType::cql_type) == default.map(MarshalType::cql_type)
    });
    if shared {
        default
    } else {
        log::debug!(
            "column family {} mixes value types, storing values as blob",
            definition.name
        );
        None
    }
}

fn cql_type(marshal: Option<MarshalType>) -> &'static str {
    marshal.map(MarshalType::cql_type).unwrap_or("blob")
}

/// CQL literal of `bytes` for a column of type `marshal` (`None` = blob)
pub fn literal(bytes: &[u8], marshal: Option<MarshalType>) -> Result<String, DriverError> {
    let marshal = match marshal {
        Some(marshal) => marshal,
        None => return Ok(format!("0x{}", hex::encode(bytes))),
    };
    let invalid = || {
        DriverError::invalid_request(format!(
            "cannot render 0x{} as {}",
            hex::encode(bytes),
            marshal.cql_type()
        ))
    };
    let rendered = match marshal {
        MarshalType::Bytes => format!("0x{}", hex::encode(bytes)),
        MarshalType::Ascii | MarshalType::Utf8 => {
            let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
            if marshal == MarshalType::Ascii && !text.is_ascii() {
                return Err(invalid());
            }
            format!("'{}'", text.replace('\'', "''"))
        }
        MarshalType::Long | MarshalType::Counter => {
            i64::from_be_bytes(<[u8; 8]>::try_from(bytes).map_err(|_| invalid())?).to_string()
        }
        MarshalType::Int32 => {
            i32::from_be_bytes(<[u8; 4]>::try_from(bytes).map_err(|_| invalid())?).to_string()
        }
        MarshalType::Integer => varint_to_i128(bytes).ok_or_else(invalid)?.to_string(),
        MarshalType::Boolean => match bytes {
            [0] => "false".to_string(),
            [_] => "true".to_string(),
            _ => return Err(invalid()),
        },
        MarshalType::Uuid | MarshalType::TimeUuid | MarshalType::LexicalUuid => uuid::Uuid::from_slice(bytes)
            .map_err(|_| invalid())?
            .hyphenated()
            .to_string(),
    };
    Ok(rendered)
}

/// Literal of `bytes` encoded as `encoded`, for a column of type `column`.
///
/// Bytes of another type than the column's are sent as a blob and converted
/// by the server, so they are stored exactly as encoded.
pub fn typed_literal(
    bytes: &[u8],
    encoded: MarshalType,
    column: Option<MarshalType>,
) -> Result<String, DriverError> {
    match column {
        Some(column) if column != MarshalType::Bytes && column.cql_type() != encoded.cql_type() => {
            let cql_type = column.cql_type();
            Ok(format!(
                "blobAs{}{}(0x{})",
                cql_type[..1].to_ascii_uppercase(),
                &cql_type[1..],
                hex::encode(bytes)
            ))
        }
        _ => literal(bytes, column),
    }
}

fn replication(definition: &KeyspaceDefinition) -> String {
    match definition.strategy {
        StrategyModel::NetworkTopologyStrategy => format!(
            "{{'class': 'NetworkTopologyStrategy', 'datacenter1': {}}}",
            definition.replication_factor
        ),
        strategy => format!(
            "{{'class': '{}', 'replication_factor': {}}}",
            strategy.short_name(),
            definition.replication_factor
        ),
    }
}

/// `CREATE KEYSPACE` for a legacy keyspace definition
pub fn create_keyspace_statement(definition: &KeyspaceDefinition) -> String {
    format!(
        "CREATE KEYSPACE {} WITH replication = {}",
        quote_identifier(&definition.name),
        replication(definition)
    )
}

/// `CREATE TABLE` standing in for a legacy column family
pub fn create_table_statement(keyspace: &str, definition: &ColumnFamilyDefinition) -> String {
    let layout = TableLayout::of(definition);
    let mut columns = vec![format!("key {}", cql_type(layout.key))];
    let mut clustering = Vec::new();
    let sub_comparator = definition.sub_comparator();
    let clustering_comparators: Vec<&ComparatorType> = if definition.is_super() {
        vec![&definition.comparator_type, &sub_comparator]
    } else {
        definition.comparator_type.components().iter().collect()
    };
    for (i, marshal) in layout.clustering.iter().enumerate() {
        let name = format!("column{}", i + 1);
        columns.push(format!("{} {}", name, cql_type(*marshal)));
        let reversed = clustering_comparators
            .get(i)
            .map(|comparator| comparator.is_reversed())
            .unwrap_or(false);
        clustering.push((name, reversed));
    }
    columns.push(format!("value {}", cql_type(layout.value)));

    let clustering_names: Vec<&str> = clustering.iter().map(|(name, _)| name.as_str()).collect();
    columns.push(format!("PRIMARY KEY ((key), {})", clustering_names.join(", ")));

    let mut options = Vec::new();
    if clustering.iter().any(|(_, reversed)| *reversed) {
        let order: Vec<String> = clustering
            .iter()
            .map(|(name, reversed)| format!("{} {}", name, if *reversed { "DESC" } else { "ASC" }))
            .collect();
        options.push(format!("CLUSTERING ORDER BY ({})", order.join(", ")));
    }
    if let Some(comment) = &definition.comment {
        options.push(format!("comment = '{}'", comment.replace('\'', "''")));
    }
    if let Some(gc_grace_seconds) = definition.gc_grace_seconds {
        options.push(format!("gc_grace_seconds = {}", gc_grace_seconds));
    }
    if let Some(compaction) = compaction_options(definition) {
        options.push(format!("compaction = {}", compaction));
    }
    if definition.read_repair_chance.is_some() || definition.replicate_on_write.is_some() {
        log::debug!(
            "read_repair_chance / replicate_on_write of {} have no CQL table option, ignored",
            definition.name
        );
    }
    for metadata in definition.column_metadata.iter().filter(|m| m.index_type.is_some()) {
        log::warn!(
            "index {} on {}.{} column {} is not created",
            metadata.index_name.as_deref().unwrap_or(&metadata.name),
            keyspace,
            definition.name,
            metadata.name
        );
    }

    let mut statement = format!(
        "CREATE TABLE {}.{} ({})",
        quote_identifier(keyspace),
        quote_identifier(&definition.name),
        columns.join(", ")
    );
    if !options.is_empty() {
        statement.push_str(" WITH ");
        statement.push_str(&options.join(" AND "));
    }
    statement
}

fn compaction_options(definition: &ColumnFamilyDefinition) -> Option<String> {
    let class = definition.compaction_strategy.as_ref()?;
    let mut entries = vec![format!("'class': '{}'", class)];
    if let Some(min) = definition.min_compaction_threshold {
        entries.push(format!("'min_threshold': '{}'", min));
    }
    if let Some(max) = definition.max_compaction_threshold {
        entries.push(format!("'max_threshold': '{}'", max));
    }
    for (name, value) in &definition.compaction_strategy_options {
        entries.push(format!("'{}': '{}'", name, value.replace('\'', "''")));
    }
    Some(format!("{{{}}}", entries.join(", ")))
}

/// Clustering columns and literals addressing one column
fn column_address(
    super_column: Option<&Value>,
    name: &Value,
    layout: &TableLayout,
) -> Result<Vec<(String, String)>, DriverError> {
    let mut parts: Vec<(MarshalType, &[u8])> = Vec::new();
    if let Some(super_column) = super_column {
        parts.push((super_column.encoded_type(), super_column.bytes()));
    }
    parts.extend(name.encoded_types().iter().copied().zip(name.components()));
    if parts.len() > layout.clustering.len() {
        return Err(DriverError::invalid_request(format!(
            "column name {} has more components than the table has clustering columns",
            name
        )));
    }
    parts
        .iter()
        .enumerate()
        .map(|(i, (encoded, bytes))| {
            Ok((
                format!("column{}", i + 1),
                typed_literal(bytes, *encoded, layout.clustering[i])?,
            ))
        })
        .collect()
}

/// `INSERT` or `UPDATE` applying a mutation to its table
pub fn mutation_statement(
    keyspace: &str,
    definition: &ColumnFamilyDefinition,
    mutation: &Mutation,
) -> Result<String, DriverError> {
    render_mutation(keyspace, &TableLayout::of(definition), mutation)
}

fn render_mutation(keyspace: &str, layout: &TableLayout, mutation: &Mutation) -> Result<String, DriverError> {
    let table = format!(
        "{}.{}",
        quote_identifier(keyspace),
        quote_identifier(mutation.column_family())
    );
    match mutation {
        Mutation::Insert {
            key,
            super_column,
            name,
            value,
            ..
        } => {
            let mut columns = vec!["key".to_string()];
            let mut values = vec![typed_literal(key.bytes(), key.encoded_type(), layout.key)?];
            for (column, literal) in column_address(super_column.as_ref(), name, layout)? {
                columns.push(column);
                values.push(literal);
            }
            columns.push("value".to_string());
            values.push(typed_literal(value.bytes(), value.encoded_type(), layout.value)?);
            Ok(format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                values.join(", ")
            ))
        }
        Mutation::Increment {
            key,
            super_column,
            name,
            delta,
            ..
        } => {
            let mut conditions = vec![format!(
                "key = {}",
                typed_literal(key.bytes(), key.encoded_type(), layout.key)?
            )];
            for (column, literal) in column_address(super_column.as_ref(), name, layout)? {
                conditions.push(format!("{} = {}", column, literal));
            }
            Ok(format!(
                "UPDATE {} SET value = value + {} WHERE {}",
                table,
                delta,
                conditions.join(" AND ")
            ))
        }
    }
}

/// Layout of a table this client did not create, from the types the values carry
fn layout_from_values(mutation: &Mutation) -> TableLayout {
    let (key, super_column, name, value) = match mutation {
        Mutation::Insert {
            key,
            super_column,
            name,
            value,
            ..
        } => (key, super_column, name, Some(value)),
        Mutation::Increment {
            key,
            super_column,
            name,
            ..
        } => (key, super_column, name, None),
    };
    let mut clustering: Vec<Option<MarshalType>> = super_column
        .iter()
        .map(|s| s.declared().marshal())
        .collect();
    clustering.extend(name.declared().components().iter().map(ComparatorType::marshal));
    TableLayout {
        key: key.declared().marshal(),
        clustering,
        value: value
            .map(|v| v.declared().marshal())
            .unwrap_or(Some(MarshalType::Counter)),
    }
}

/// Legacy client expressing column families as CQL tables
pub struct CqlLegacyClient<S> {
    session: S,
    layouts: Mutex<HashMap<(String, String), TableLayout>>,
}

impl<S: CqlSession> CqlLegacyClient<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            layouts: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_inner(self) -> S {
        self.session
    }
}

#[async_trait]
impl<S: CqlSession> LegacyClient for CqlLegacyClient<S> {
    async fn keyspace_exists(&self, keyspace: &str) -> Result<bool, DriverError> {
        let rows = self
            .session
            .query(&format!(
                "SELECT keyspace_name FROM system_schema.keyspaces WHERE keyspace_name = '{}'",
                keyspace.replace('\'', "''")
            ))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn column_family_exists(&self, keyspace: &str, column_family: &str) -> Result<bool, DriverError> {
        let rows = self
            .session
            .query(&format!(
                "SELECT table_name FROM system_schema.tables WHERE keyspace_name = '{}' AND table_name = '{}'",
                keyspace.replace('\'', "''"),
                column_family.replace('\'', "''")
            ))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn drop_keyspace(&self, keyspace: &str) -> Result<(), DriverError> {
        self.session
            .execute(&format!("DROP KEYSPACE {}", quote_identifier(keyspace)))
            .await?;
        self.layouts.lock().retain(|(ks, _), _| ks != keyspace);
        Ok(())
    }

    async fn add_keyspace(&self, definition: &KeyspaceDefinition) -> Result<(), DriverError> {
        self.session.execute(&create_keyspace_statement(definition)).await
    }

    async fn add_column_family(
        &self,
        keyspace: &str,
        definition: &ColumnFamilyDefinition,
    ) -> Result<(), DriverError> {
        self.session
            .execute(&create_table_statement(keyspace, definition))
            .await?;
        self.layouts.lock().insert(
            (keyspace.to_string(), definition.name.clone()),
            TableLayout::of(definition),
        );
        Ok(())
    }

    async fn apply(&self, keyspace: &str, mutation: Mutation) -> Result<(), DriverError> {
        let layout = self
            .layouts
            .lock()
            .get(&(keyspace.to_string(), mutation.column_family().to_string()))
            .cloned()
            .unwrap_or_else(|| layout_from_values(&mutation));
        let statement = render_mutation(keyspace, &layout, &mutation)?;
        self.session.execute(&statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryCluster;
    use crate::model::{ColumnMetadata, ColumnType, IndexType};

    fn standard(name: &str) -> ColumnFamilyDefinition {
        let mut definition = ColumnFamilyDefinition::new(name);
        definition.key_type = ComparatorType::simple(MarshalType::Utf8);
        definition.comparator_type = ComparatorType::simple(MarshalType::Long);
        definition.default_column_value_type = ComparatorType::simple(MarshalType::Utf8);
        definition
    }

    #[test]
    fn test_parse_cqlsh_output() {
        let output = r#"
 id | name    | age
----+---------+-----
  1 | Alice   |  30
  2 | Bob     |  25
  3 | Charlie |  35

(3 rows)
"#;
        let parsed = parse_cqlsh_output(output);
        assert_eq!(parsed.headers, vec!["id", "name", "age"]);
        assert_eq!(parsed.rows.len(), 3);
        assert_eq!(parsed.rows[0], vec!["1", "Alice", "30"]);
        assert_eq!(parsed.rows[2], vec!["3", "Charlie", "35"]);
    }

    #[test]
    fn test_parse_single_column_and_empty_output() {
        let output = "\n keyspace_name\n---------------\n     system\n  my_ks\n\n(2 rows)\n";
        let parsed = parse_cqlsh_output(output);
        assert_eq!(parsed.headers, vec!["keyspace_name"]);
        assert_eq!(parsed.rows, vec![vec!["system"], vec!["my_ks"]]);

        assert_eq!(parse_cqlsh_output(""), CqlshOutput::default());
    }

    #[test]
    fn test_classify_error() {
        let stderr = "<stdin>:1:InvalidRequest: Error from server: code=2200 [Invalid query] message=\"Keyspace 'nope' does not exist\"";
        assert_eq!(
            classify_error(stderr),
            DriverError::invalid_request("Keyspace 'nope' does not exist")
        );
        assert!(matches!(
            classify_error("Connection error: ('Unable to connect to any servers', {})"),
            DriverError::Connection(_)
        ));
        assert!(matches!(
            classify_error("Error response from daemon: No such container: cassandra-unit"),
            DriverError::Connection(_)
        ));
        assert!(matches!(
            classify_error("OperationTimedOut: errors={}, last_host=127.0.0.1"),
            DriverError::Timeout(_)
        ));
    }

    #[test]
    fn test_command_args_carry_keyspace() {
        let session = CqlshSession::new("cassandra-unit", Duration::from_secs(10));
        assert_eq!(
            session.command_args("SELECT now() FROM system.local"),
            vec!["exec", "cassandra-unit", "cqlsh", "--request-timeout", "10", "-e", "SELECT now() FROM system.local;"]
        );
        *session.keyspace.lock() = Some("ks".to_string());
        let args = session.command_args("INSERT INTO t (id) VALUES (1);");
        assert_eq!(&args[5..7], &["-k".to_string(), "ks".to_string()]);
        assert_eq!(args.last().unwrap(), "INSERT INTO t (id) VALUES (1);");
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal(&[0x11, 0x10], None).unwrap(), "0x1110");
        assert_eq!(literal(b"it's", Some(MarshalType::Utf8)).unwrap(), "'it''s'");
        assert_eq!(literal(&42i64.to_be_bytes(), Some(MarshalType::Long)).unwrap(), "42");
        assert_eq!(literal(&[0xff, 0x7f], Some(MarshalType::Integer)).unwrap(), "-129");
        assert_eq!(literal(&[1], Some(MarshalType::Boolean)).unwrap(), "true");
        let uuid = uuid::Uuid::parse_str("13816710-1dd2-11b2-879a-782bcb80ff6a").unwrap();
        assert_eq!(
            literal(uuid.as_bytes(), Some(MarshalType::TimeUuid)).unwrap(),
            "13816710-1dd2-11b2-879a-782bcb80ff6a"
        );
        assert!(matches!(
            literal(b"abc", Some(MarshalType::Long)),
            Err(DriverError::InvalidRequest(_))
        ));
        assert!(literal(&[0xff, 0xfe], Some(MarshalType::Utf8)).is_err());
    }

    #[test]
    fn test_typed_literals_keep_encoded_bytes() {
        assert_eq!(
            typed_literal(&12i64.to_be_bytes(), MarshalType::Long, Some(MarshalType::Utf8)).unwrap(),
            "blobAsText(0x000000000000000c)"
        );
        assert_eq!(
            typed_literal(&[0xff], MarshalType::Bytes, Some(MarshalType::Utf8)).unwrap(),
            "blobAsText(0xff)"
        );
        assert_eq!(
            typed_literal(b"abc", MarshalType::Utf8, Some(MarshalType::Bytes)).unwrap(),
            "0x616263"
        );
        assert_eq!(
            typed_literal(&7i64.to_be_bytes(), MarshalType::Long, None).unwrap(),
            "0x0000000000000007"
        );
        // same CQL type, rendered as a plain literal
        let uuid = uuid::Uuid::parse_str("6f7e9b4e-1a6a-4c0e-9a58-6d6c2f1d2b31").unwrap();
        assert_eq!(
            typed_literal(uuid.as_bytes(), MarshalType::LexicalUuid, Some(MarshalType::Uuid)).unwrap(),
            "6f7e9b4e-1a6a-4c0e-9a58-6d6c2f1d2b31"
        );
    }

    #[test]
    fn test_create_standard_table() {
        let mut definition = standard("beautifulColumnFamilyName");
        definition.comment = Some("amazing comment".to_string());
        definition.gc_grace_seconds = Some(9999);
        definition.compaction_strategy = Some("LeveledCompactionStrategy".to_string());
        definition
            .compaction_strategy_options
            .insert("sstable_size_in_mb".to_string(), "10".to_string());
        assert_eq!(
            create_table_statement("ks", &definition),
            "CREATE TABLE \"ks\".\"beautifulColumnFamilyName\" (key text, column1 bigint, value text, \
             PRIMARY KEY ((key), column1)) WITH comment = 'amazing comment' AND gc_grace_seconds = 9999 \
             AND compaction = {'class': 'LeveledCompactionStrategy', 'sstable_size_in_mb': '10'}"
        );
    }

    #[test]
    fn test_create_super_counter_and_reversed_tables() {
        let mut definition = standard("super");
        definition.column_type = ColumnType::Super;
        definition.comparator_type = ComparatorType::reversed(MarshalType::Utf8);
        definition.sub_comparator_type = Some(ComparatorType::simple(MarshalType::Long));
        definition.default_column_value_type = ComparatorType::simple(MarshalType::Counter);
        assert_eq!(
            create_table_statement("ks", &definition),
            "CREATE TABLE \"ks\".\"super\" (key text, column1 text, column2 bigint, value counter, \
             PRIMARY KEY ((key), column1, column2)) WITH CLUSTERING ORDER BY (column1 DESC, column2 ASC)"
        );
    }

    #[test]
    fn test_mixed_validators_use_blob_values() {
        let mut definition = standard("users");
        definition.column_metadata.push(ColumnMetadata {
            name: "age".to_string(),
            validation_class: ComparatorType::simple(MarshalType::Long),
            index_type: Some(IndexType::Keys),
            index_name: Some("age_idx".to_string()),
        });
        let statement = create_table_statement("ks", &definition);
        assert!(statement.contains("value blob"));
        assert!(!statement.contains("INDEX"));
    }

    #[test]
    fn test_mutation_statements() {
        let definition = standard("cf");
        let insert = Mutation::Insert {
            column_family: "cf".to_string(),
            key: Value::parse("key10", &definition.key_type).unwrap(),
            super_column: None,
            name: Value::parse("12", &definition.comparator_type).unwrap(),
            value: Value::parse("value11", &definition.default_column_value_type).unwrap(),
        };
        assert_eq!(
            mutation_statement("ks", &definition, &insert).unwrap(),
            "INSERT INTO \"ks\".\"cf\" (key, column1, value) VALUES ('key10', 12, 'value11')"
        );

        let typed = Mutation::Insert {
            column_family: "cf".to_string(),
            key: Value::parse("key10", &definition.key_type).unwrap(),
            super_column: None,
            name: Value::parse("utf8(abc)", &definition.comparator_type).unwrap(),
            value: Value::parse("long(12)", &definition.default_column_value_type).unwrap(),
        };
        assert_eq!(
            mutation_statement("ks", &definition, &typed).unwrap(),
            "INSERT INTO \"ks\".\"cf\" (key, column1, value) \
             VALUES ('key10', blobAsBigint(0x616263), blobAsText(0x000000000000000c))"
        );

        let mut counters = standard("counters");
        counters.default_column_value_type = ComparatorType::simple(MarshalType::Counter);
        let increment = Mutation::Increment {
            column_family: "counters".to_string(),
            key: Value::parse("row", &counters.key_type).unwrap(),
            super_column: None,
            name: Value::parse("1", &counters.comparator_type).unwrap(),
            delta: 5,
        };
        assert_eq!(
            mutation_statement("ks", &counters, &increment).unwrap(),
            "UPDATE \"ks\".\"counters\" SET value = value + 5 WHERE key = 'row' AND column1 = 1"
        );
    }

    #[tokio::test]
    async fn test_legacy_client_over_memory_session() {
        let cluster = MemoryCluster::new();
        let client = CqlLegacyClient::new(cluster.session());

        assert!(!client.keyspace_exists("LegacyKs").await.unwrap());
        client
            .add_keyspace(&KeyspaceDefinition::new("LegacyKs"))
            .await
            .unwrap();
        assert!(client.keyspace_exists("LegacyKs").await.unwrap());

        let definition = standard("cf");
        client.add_column_family("LegacyKs", &definition).await.unwrap();
        assert!(client.column_family_exists("LegacyKs", "cf").await.unwrap());

        client
            .apply(
                "LegacyKs",
                Mutation::Insert {
                    column_family: "cf".to_string(),
                    key: Value::parse("key1", &definition.key_type).unwrap(),
                    super_column: None,
                    name: Value::parse("1", &definition.comparator_type).unwrap(),
                    value: Value::parse("it's here", &definition.default_column_value_type).unwrap(),
                },
            )
            .await
            .unwrap();

        let rows = cluster.table_rows("LegacyKs", "cf");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["key"], "key1");
        assert_eq!(rows[0]["column1"], "1");
        assert_eq!(rows[0]["value"], "it's here");

        client.drop_keyspace("LegacyKs").await.unwrap();
        assert!(!client.keyspace_exists("LegacyKs").await.unwrap());
    }
}
