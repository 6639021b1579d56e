//! Dataset files
//!
//! Two kinds of dataset exist: CQL scripts ([`cql::CqlDataSet`]) and the
//! legacy structured description of a keyspace, its column families and
//! rows. Legacy datasets are written in JSON or YAML with camelCase keys; this
//! module turns them into a [`KeyspaceModel`] with every default applied and
//! every value encoded.

pub mod cql;

pub use cql::CqlDataSet;

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{
    ColumnFamilyDefinition, ColumnFamilyModel, ColumnMetadata, ColumnModel, ColumnType,
    ComparatorType, IndexType, KeyspaceDefinition, KeyspaceModel, MarshalType, RowModel,
    StrategyModel, SuperColumnModel, Value,
};
use crate::resource::ResourceProvider;

/// Serialization format of a legacy dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetFormat {
    Json,
    Yaml,
}

impl DataSetFormat {
    /// Format from a location's extension
    pub fn from_location(location: &str) -> Result<Self> {
        let extension = location
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(DataSetFormat::Json),
            "yaml" | "yml" => Ok(DataSetFormat::Yaml),
            _ => Err(Error::data_set(format!(
                "cannot tell the dataset format of '{}' (expected .json, .yaml or .yml)",
                location
            ))),
        }
    }
}

/// Read and parse a legacy dataset from a resource location
pub fn load_legacy_data_set(resources: &dyn ResourceProvider, location: &str) -> Result<KeyspaceModel> {
    let format = DataSetFormat::from_location(location)?;
    let content = resources.read_to_string(location)?;
    parse_legacy_data_set(&content, format)
        .map_err(|e| Error::data_set(format!("{}: {}", location, e)))
}

/// Parse a legacy dataset document
pub fn parse_legacy_data_set(content: &str, format: DataSetFormat) -> Result<KeyspaceModel> {
    let parsed: ParsedKeyspace = match format {
        DataSetFormat::Json => serde_json::from_str(content)?,
        DataSetFormat::Yaml => serde_yaml::from_str(content)?,
    };
    parsed.into_model()
}

/// Scalars are accepted as strings, numbers or booleans
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl Scalar {
    /// Text handed to the value parser for a position declared as `declared`.
    ///
    /// Numbers reach us already re-rendered in decimal (`0x10` arrives as
    /// 16), so they are refused where literals are hexadecimal.
    fn literal_for(&self, declared: &ComparatorType, position: &str) -> Result<String> {
        let hexadecimal = declared
            .components()
            .iter()
            .any(|component| component.marshal() == Some(MarshalType::Bytes));
        match self {
            Scalar::Integer(_) | Scalar::Float(_) if hexadecimal => Err(Error::data_set(format!(
                "{} {} is a number but {} literals are hexadecimal, quote it",
                position, self, declared
            ))),
            _ => Ok(self.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedKeyspace {
    name: Option<String>,
    replication_factor: Option<u32>,
    strategy: Option<String>,
    #[serde(default)]
    column_families: Vec<ParsedColumnFamily>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedColumnFamily {
    name: Option<String>,
    #[serde(rename = "type")]
    column_type: Option<String>,
    key_type: Option<String>,
    comparator_type: Option<String>,
    sub_comparator_type: Option<String>,
    default_column_value_type: Option<String>,
    comment: Option<String>,
    compaction_strategy: Option<String>,
    #[serde(default)]
    compaction_strategy_options: Vec<ParsedOption>,
    gc_grace_seconds: Option<i32>,
    max_compaction_threshold: Option<i32>,
    min_compaction_threshold: Option<i32>,
    read_repair_chance: Option<f64>,
    #[serde(alias = "replicationOnWrite")]
    replicate_on_write: Option<bool>,
    #[serde(default, alias = "columnMetadata")]
    columns_metadata: Vec<ParsedColumnMetadata>,
    #[serde(default)]
    rows: Vec<ParsedRow>,
}

#[derive(Debug, Deserialize)]
struct ParsedOption {
    name: String,
    value: Scalar,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedColumnMetadata {
    name: String,
    validation_class: Option<String>,
    index_type: Option<String>,
    index_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedRow {
    key: Scalar,
    #[serde(default)]
    columns: Vec<ParsedColumn>,
    #[serde(default)]
    super_columns: Vec<ParsedSuperColumn>,
}

#[derive(Debug, Deserialize)]
struct ParsedSuperColumn {
    name: Scalar,
    #[serde(default)]
    columns: Vec<ParsedColumn>,
}

#[derive(Debug, Deserialize)]
struct ParsedColumn {
    name: Scalar,
    value: Option<Scalar>,
}

fn comparator_or_default(raw: Option<&str>) -> Result<ComparatorType> {
    raw.map(ComparatorType::parse)
        .transpose()
        .map(Option::unwrap_or_default)
}

impl ParsedKeyspace {
    fn into_model(self) -> Result<KeyspaceModel> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::data_set("keyspace name is mandatory"))?;
        let strategy = self
            .strategy
            .as_deref()
            .map(str::parse::<StrategyModel>)
            .transpose()?
            .unwrap_or_default();
        let definition = KeyspaceDefinition {
            name,
            strategy,
            replication_factor: self.replication_factor.unwrap_or(1),
        };

        let mut column_families: Vec<ColumnFamilyModel> = Vec::new();
        for parsed in self.column_families {
            let column_family = parsed.into_model()?;
            if column_families
                .iter()
                .any(|cf| cf.definition.name == column_family.definition.name)
            {
                return Err(Error::data_set(format!(
                    "column family '{}' is defined twice",
                    column_family.definition.name
                )));
            }
            column_families.push(column_family);
        }

        Ok(KeyspaceModel {
            definition,
            column_families,
        })
    }
}

impl ParsedColumnFamily {
    fn into_model(self) -> Result<ColumnFamilyModel> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::data_set("column family name is mandatory"))?;
        let column_type = match self.column_type.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("STANDARD") => ColumnType::Standard,
            Some("SUPER") => ColumnType::Super,
            Some(other) => {
                return Err(Error::data_set(format!(
                    "column family '{}': unknown column type '{}'",
                    name, other
                )))
            }
        };

        let column_metadata = self
            .columns_metadata
            .into_iter()
            .map(|metadata| -> Result<ColumnMetadata> {
                let index_type = metadata
                    .index_type
                    .as_deref()
                    .map(str::parse::<IndexType>)
                    .transpose()?;
                let index_name = match (index_type, metadata.index_name) {
                    (Some(_), None) => Some(metadata.name.clone()),
                    (_, index_name) => index_name,
                };
                Ok(ColumnMetadata {
                    validation_class: comparator_or_default(metadata.validation_class.as_deref())?,
                    name: metadata.name,
                    index_type,
                    index_name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let compaction_strategy_options: BTreeMap<String, String> = self
            .compaction_strategy_options
            .into_iter()
            .map(|option| (option.name, option.value.to_string()))
            .collect();

        let definition = ColumnFamilyDefinition {
            column_type,
            key_type: comparator_or_default(self.key_type.as_deref())?,
            comparator_type: comparator_or_default(self.comparator_type.as_deref())?,
            sub_comparator_type: self
                .sub_comparator_type
                .as_deref()
                .map(ComparatorType::parse)
                .transpose()?,
            default_column_value_type: comparator_or_default(self.default_column_value_type.as_deref())?,
            comment: self.comment,
            compaction_strategy: self.compaction_strategy,
            compaction_strategy_options,
            gc_grace_seconds: self.gc_grace_seconds,
            max_compaction_threshold: self.max_compaction_threshold,
            min_compaction_threshold: self.min_compaction_threshold,
            read_repair_chance: self.read_repair_chance,
            replicate_on_write: self.replicate_on_write,
            column_metadata,
            name,
        };

        let rows = self
            .rows
            .into_iter()
            .map(|row| row.into_model(&definition))
            .collect::<Result<Vec<_>>>()?;

        Ok(ColumnFamilyModel { definition, rows })
    }
}

impl ParsedRow {
    fn into_model(self, definition: &ColumnFamilyDefinition) -> Result<RowModel> {
        let key_literal = self.key.literal_for(&definition.key_type, "key")?;
        let key = Value::parse(&key_literal, &definition.key_type)?;
        match definition.column_type {
            ColumnType::Standard if !self.super_columns.is_empty() => {
                return Err(Error::data_set(format!(
                    "column family '{}' is STANDARD but row '{}' has super columns",
                    definition.name, self.key
                )))
            }
            ColumnType::Super if !self.columns.is_empty() => {
                return Err(Error::data_set(format!(
                    "column family '{}' is SUPER but row '{}' has plain columns",
                    definition.name, self.key
                )))
            }
            _ => {}
        }

        let columns = self
            .columns
            .into_iter()
            .map(|column| column.into_model(definition, &definition.comparator_type))
            .collect::<Result<Vec<_>>>()?;

        let sub_comparator = definition.sub_comparator();
        let super_columns = self
            .super_columns
            .into_iter()
            .map(|super_column| -> Result<SuperColumnModel> {
                Ok(SuperColumnModel {
                    name: Value::parse(
                        &super_column
                            .name
                            .literal_for(&definition.comparator_type, "super column name")?,
                        &definition.comparator_type,
                    )?,
                    columns: super_column
                        .columns
                        .into_iter()
                        .map(|column| column.into_model(definition, &sub_comparator))
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RowModel {
            key,
            columns,
            super_columns,
        })
    }
}

impl ParsedColumn {
    fn into_model(self, definition: &ColumnFamilyDefinition, name_type: &ComparatorType) -> Result<ColumnModel> {
        let name = Value::parse(&self.name.literal_for(name_type, "column name")?, name_type)?;
        let validator = definition.validator_for(name.bytes()).clone();
        let raw_value = match &self.value {
            Some(value) => value.literal_for(&validator, "column value")?,
            None => String::new(),
        };
        if validator.is_counter() && raw_value.is_empty() {
            return Err(Error::data_set(format!(
                "counter column '{}' in '{}' needs a value",
                self.name, definition.name
            )));
        }
        let value = Value::parse(&raw_value, &validator)?;
        Ok(ColumnModel { name, value })
    }
}
