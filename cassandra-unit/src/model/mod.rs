//! Data model shared by the loaders, the driver seam and the listener

pub mod comparator;
pub mod value;

pub use comparator::{ComparatorType, MarshalType};
pub use value::Value;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Connection target of a load call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl ClusterDescriptor {
    /// Build a descriptor, rejecting empty names and port 0
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Result<Self> {
        let descriptor = Self {
            name: name.into(),
            host: host.into(),
            port,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("cluster name must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(Error::configuration("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::configuration("port must be > 0"));
        }
        Ok(())
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Keyspace replication strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum StrategyModel {
    #[default]
    SimpleStrategy,
    NetworkTopologyStrategy,
    OldNetworkTopologyStrategy,
}

impl StrategyModel {
    const PACKAGE: &'static str = "org.apache.cassandra.locator.";

    pub fn short_name(self) -> &'static str {
        match self {
            StrategyModel::SimpleStrategy => "SimpleStrategy",
            StrategyModel::NetworkTopologyStrategy => "NetworkTopologyStrategy",
            StrategyModel::OldNetworkTopologyStrategy => "OldNetworkTopologyStrategy",
        }
    }

    /// Fully qualified Cassandra class name
    pub fn class_name(self) -> String {
        format!("{}{}", Self::PACKAGE, self.short_name())
    }
}

impl fmt::Display for StrategyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name())
    }
}

impl FromStr for StrategyModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let short = s.trim();
        let short = short.strip_prefix(Self::PACKAGE).unwrap_or(short);
        [
            StrategyModel::SimpleStrategy,
            StrategyModel::NetworkTopologyStrategy,
            StrategyModel::OldNetworkTopologyStrategy,
        ]
        .into_iter()
        .find(|strategy| strategy.short_name().eq_ignore_ascii_case(short))
        .ok_or_else(|| Error::data_set(format!("unknown replication strategy '{}'", s)))
    }
}

impl TryFrom<String> for StrategyModel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StrategyModel> for String {
    fn from(value: StrategyModel) -> Self {
        value.class_name()
    }
}

/// Overrides applied to every keyspace created during one load call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingOption {
    /// Create keyspaces and column families but insert no rows
    #[serde(default)]
    pub only_schema: bool,
    #[serde(default)]
    pub replication_factor: Option<u32>,
    #[serde(default)]
    pub strategy: Option<StrategyModel>,
}

impl LoadingOption {
    pub fn only_schema() -> Self {
        Self {
            only_schema: true,
            ..Self::default()
        }
    }

    pub fn with_replication_factor(mut self, replication_factor: u32) -> Self {
        self.replication_factor = Some(replication_factor);
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyModel) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Apply the overrides to a keyspace definition
    pub fn apply(&self, definition: &KeyspaceDefinition) -> KeyspaceDefinition {
        KeyspaceDefinition {
            name: definition.name.clone(),
            strategy: self.strategy.unwrap_or(definition.strategy),
            replication_factor: self.replication_factor.unwrap_or(definition.replication_factor),
        }
    }
}

/// Kind of dataset file, selecting the loading strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataSetType {
    /// Semicolon terminated CQL statements
    #[default]
    Cql,
    /// Structured schema + rows description (JSON or YAML)
    Legacy,
}

impl DataSetType {
    /// File extensions tried, in order, when looking a dataset up by test name
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            DataSetType::Cql => &["cql"],
            DataSetType::Legacy => &["json", "yaml"],
        }
    }
}

/// Keyspace as created through the legacy client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceDefinition {
    pub name: String,
    pub strategy: StrategyModel,
    pub replication_factor: u32,
}

impl KeyspaceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: StrategyModel::SimpleStrategy,
            replication_factor: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    #[default]
    Standard,
    Super,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Keys,
    Custom,
    Composites,
}

impl FromStr for IndexType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KEYS" => Ok(IndexType::Keys),
            "CUSTOM" => Ok(IndexType::Custom),
            "COMPOSITES" => Ok(IndexType::Composites),
            other => Err(Error::data_set(format!("unknown index type '{}'", other))),
        }
    }
}

/// Declared metadata of a named column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    pub validation_class: ComparatorType,
    pub index_type: Option<IndexType>,
    pub index_name: Option<String>,
}

/// Column family schema, without data
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFamilyDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub key_type: ComparatorType,
    pub comparator_type: ComparatorType,
    pub sub_comparator_type: Option<ComparatorType>,
    pub default_column_value_type: ComparatorType,
    pub comment: Option<String>,
    pub compaction_strategy: Option<String>,
    pub compaction_strategy_options: BTreeMap<String, String>,
    pub gc_grace_seconds: Option<i32>,
    pub max_compaction_threshold: Option<i32>,
    pub min_compaction_threshold: Option<i32>,
    pub read_repair_chance: Option<f64>,
    pub replicate_on_write: Option<bool>,
    pub column_metadata: Vec<ColumnMetadata>,
}

impl ColumnFamilyDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Standard,
            key_type: ComparatorType::default(),
            comparator_type: ComparatorType::default(),
            sub_comparator_type: None,
            default_column_value_type: ComparatorType::default(),
            comment: None,
            compaction_strategy: None,
            compaction_strategy_options: BTreeMap::new(),
            gc_grace_seconds: None,
            max_compaction_threshold: None,
            min_compaction_threshold: None,
            read_repair_chance: None,
            replicate_on_write: None,
            column_metadata: Vec::new(),
        }
    }

    pub fn is_counter(&self) -> bool {
        self.default_column_value_type.is_counter()
    }

    pub fn is_super(&self) -> bool {
        self.column_type == ColumnType::Super
    }

    /// Sub column comparator of a super column family
    pub fn sub_comparator(&self) -> ComparatorType {
        self.sub_comparator_type.clone().unwrap_or_default()
    }

    /// Validator of the value stored under `column_name`
    pub fn validator_for(&self, column_name: &[u8]) -> &ComparatorType {
        self.column_metadata
            .iter()
            .find(|metadata| metadata.name.as_bytes() == column_name)
            .map(|metadata| &metadata.validation_class)
            .unwrap_or(&self.default_column_value_type)
    }
}

/// A keyspace and its column families, as described by a legacy dataset
#[derive(Debug, Clone, PartialEq)]
pub struct KeyspaceModel {
    pub definition: KeyspaceDefinition,
    pub column_families: Vec<ColumnFamilyModel>,
}

impl KeyspaceModel {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn column_family(&self, name: &str) -> Option<&ColumnFamilyModel> {
        self.column_families.iter().find(|cf| cf.definition.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFamilyModel {
    pub definition: ColumnFamilyDefinition,
    pub rows: Vec<RowModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowModel {
    pub key: Value,
    pub columns: Vec<ColumnModel>,
    pub super_columns: Vec<SuperColumnModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperColumnModel {
    pub name: Value,
    pub columns: Vec<ColumnModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModel {
    pub name: Value,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_descriptor_validation() {
        let cluster = ClusterDescriptor::new("Test Cluster", "127.0.0.1", 9142).unwrap();
        assert_eq!(cluster.address(), "127.0.0.1:9142");

        assert!(matches!(
            ClusterDescriptor::new("Test Cluster", "127.0.0.1", 0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            ClusterDescriptor::new("", "127.0.0.1", 9142),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            ClusterDescriptor::new("Test Cluster", " ", 9142),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(
            "org.apache.cassandra.locator.NetworkTopologyStrategy".parse::<StrategyModel>().unwrap(),
            StrategyModel::NetworkTopologyStrategy
        );
        assert_eq!(
            "SimpleStrategy".parse::<StrategyModel>().unwrap(),
            StrategyModel::SimpleStrategy
        );
        assert!("LocalStrategy".parse::<StrategyModel>().is_err());
        assert_eq!(
            StrategyModel::SimpleStrategy.class_name(),
            "org.apache.cassandra.locator.SimpleStrategy"
        );
    }

    #[test]
    fn test_loading_option_overrides_win() {
        let definition = KeyspaceDefinition {
            name: "beautifulKeyspaceName".to_string(),
            strategy: StrategyModel::NetworkTopologyStrategy,
            replication_factor: 2,
        };
        let options = LoadingOption::default()
            .with_replication_factor(1)
            .with_strategy(StrategyModel::SimpleStrategy);
        let applied = options.apply(&definition);
        assert_eq!(applied.replication_factor, 1);
        assert_eq!(applied.strategy, StrategyModel::SimpleStrategy);

        let untouched = LoadingOption::default().apply(&definition);
        assert_eq!(untouched, definition);
    }

    #[test]
    fn test_validator_lookup() {
        let mut definition = ColumnFamilyDefinition::new("cf");
        definition.default_column_value_type = ComparatorType::simple(MarshalType::Utf8);
        definition.column_metadata.push(ColumnMetadata {
            name: "age".to_string(),
            validation_class: ComparatorType::simple(MarshalType::Long),
            index_type: None,
            index_name: None,
        });
        assert_eq!(
            definition.validator_for(b"age"),
            &ComparatorType::simple(MarshalType::Long)
        );
        assert_eq!(
            definition.validator_for(b"name"),
            &ComparatorType::simple(MarshalType::Utf8)
        );
    }

    #[test]
    fn test_data_set_type_extensions() {
        assert_eq!(DataSetType::Cql.extensions(), &["cql"]);
        assert_eq!(DataSetType::Legacy.extensions(), &["json", "yaml"]);
        assert_eq!(DataSetType::default(), DataSetType::Cql);
    }
}
