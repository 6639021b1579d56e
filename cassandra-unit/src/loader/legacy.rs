//! Legacy (JSON / YAML) dataset loading

use async_trait::async_trait;

use crate::dataset::load_legacy_data_set;
use crate::driver::{LegacyClient, Mutation};
use crate::embedded::CassandraServer;
use crate::error::{Error, Result};
use crate::loader::{DataSetStrategy, LoadRequest};
use crate::model::{ColumnFamilyModel, ColumnModel, KeyspaceModel, LoadingOption, Value};
use crate::resource::ResourceProvider;

/// Applies keyspace models through typed client calls
pub struct DataLoader<C> {
    client: C,
}

impl<C: LegacyClient> DataLoader<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Create the schema of `data_set` and insert its rows.
    ///
    /// With `recreate` an existing keyspace is dropped first; without it the
    /// keyspace and column families are only created when missing.
    pub async fn load(&self, data_set: &KeyspaceModel, options: &LoadingOption, recreate: bool) -> Result<()> {
        let definition = options.apply(&data_set.definition);
        let keyspace = definition.name.as_str();

        let exists = self.client.keyspace_exists(keyspace).await?;
        if recreate && exists {
            log::debug!("Dropping keyspace {}", keyspace);
            self.client.drop_keyspace(keyspace).await?;
        }
        if recreate || !exists {
            log::debug!(
                "Creating keyspace {} ({}, replication factor {})",
                keyspace,
                definition.strategy.short_name(),
                definition.replication_factor
            );
            self.client.add_keyspace(&definition).await?;
        }

        for column_family in &data_set.column_families {
            let name = &column_family.definition.name;
            let create = recreate || !exists || !self.client.column_family_exists(keyspace, name).await?;
            if create {
                log::debug!("Creating column family {}.{}", keyspace, name);
                self.client
                    .add_column_family(keyspace, &column_family.definition)
                    .await?;
            }
        }

        if options.only_schema {
            log::debug!("Schema only, no rows inserted into {}", keyspace);
            return Ok(());
        }

        for column_family in &data_set.column_families {
            for mutation in mutations(column_family)? {
                self.client.apply(keyspace, mutation).await?;
            }
        }
        Ok(())
    }
}

/// Writes of one column family, rows in file order
fn mutations(column_family: &ColumnFamilyModel) -> Result<Vec<Mutation>> {
    let name = &column_family.definition.name;
    let counter = column_family.definition.is_counter();
    let mutation = |key: &Value, super_column: Option<&Value>, column: &ColumnModel| -> Result<Mutation> {
        if counter {
            let delta = column.value.as_i64().ok_or_else(|| {
                Error::data_set(format!(
                    "counter column {} of {} needs a long value",
                    column.name, name
                ))
            })?;
            Ok(Mutation::Increment {
                column_family: name.clone(),
                key: key.clone(),
                super_column: super_column.cloned(),
                name: column.name.clone(),
                delta,
            })
        } else {
            Ok(Mutation::Insert {
                column_family: name.clone(),
                key: key.clone(),
                super_column: super_column.cloned(),
                name: column.name.clone(),
                value: column.value.clone(),
            })
        }
    };

    let mut mutations = Vec::new();
    for row in &column_family.rows {
        for column in &row.columns {
            mutations.push(mutation(&row.key, None, column)?);
        }
        for super_column in &row.super_columns {
            for column in &super_column.columns {
                mutations.push(mutation(&row.key, Some(&super_column.name), column)?);
            }
        }
    }
    Ok(mutations)
}

/// Strategy for [`crate::model::DataSetType::Legacy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyStrategy;

#[async_trait]
impl DataSetStrategy for LegacyStrategy {
    async fn load(
        &self,
        server: &dyn CassandraServer,
        resources: &dyn ResourceProvider,
        request: &LoadRequest,
    ) -> Result<()> {
        let data_sets = request
            .locations
            .iter()
            .map(|location| load_legacy_data_set(resources, location))
            .collect::<Result<Vec<_>>>()?;

        let loader = DataLoader::new(server.legacy_client(&request.cluster).await?);
        for (index, (data_set, location)) in data_sets.iter().zip(&request.locations).enumerate() {
            log::info!("Loading dataset {} into keyspace {}", location, data_set.name());
            loader.load(data_set, &request.options, index == 0).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{parse_legacy_data_set, DataSetFormat};

    #[test]
    fn test_counter_rows_become_increments() {
        let data_set = parse_legacy_data_set(
            r#"{
                "name": "ks",
                "columnFamilies": [{
                    "name": "counters",
                    "keyType": "UTF8Type",
                    "comparatorType": "UTF8Type",
                    "defaultColumnValueType": "CounterColumnType",
                    "rows": [{"key": "k", "columns": [{"name": "hits", "value": "7"}]}]
                }]
            }"#,
            DataSetFormat::Json,
        )
        .unwrap();
        let mutations = mutations(&data_set.column_families[0]).unwrap();
        assert_eq!(mutations.len(), 1);
        assert!(matches!(&mutations[0], Mutation::Increment { delta: 7, .. }));
    }

    #[test]
    fn test_super_columns_carry_their_name() {
        let data_set = parse_legacy_data_set(
            r#"
name: ks
columnFamilies:
  - name: super
    type: SUPER
    keyType: UTF8Type
    comparatorType: UTF8Type
    subComparatorType: UTF8Type
    defaultColumnValueType: UTF8Type
    rows:
      - key: k
        superColumns:
          - name: sc
            columns:
              - {name: a, value: "1"}
              - {name: b, value: "2"}
"#,
            DataSetFormat::Yaml,
        )
        .unwrap();
        let mutations = mutations(&data_set.column_families[0]).unwrap();
        assert_eq!(mutations.len(), 2);
        for mutation in &mutations {
            match mutation {
                Mutation::Insert { super_column, .. } => {
                    assert_eq!(super_column.as_ref().map(|s| s.bytes()), Some(&b"sc"[..]))
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
