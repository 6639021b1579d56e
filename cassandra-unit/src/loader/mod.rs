//! Dataset loading
//!
//! [`load`] resolves the files of a [`LoadRequest`] and applies them in order
//! through the strategy of the request's [`DataSetType`]. Only the first file
//! recreates the target keyspace. Driver errors stop the load and surface
//! unchanged; files already applied stay applied.

pub mod cql;
pub mod legacy;

pub use cql::{CqlDataLoader, CqlStrategy};
pub use legacy::{DataLoader, LegacyStrategy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedded::CassandraServer;
use crate::error::{Error, Result};
use crate::model::{ClusterDescriptor, DataSetType, LoadingOption};
use crate::resource::ResourceProvider;

/// Keyspace CQL datasets load into when none is named
pub const DEFAULT_KEYSPACE: &str = "cassandraunitkeyspace";

/// Everything one load call needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub cluster: ClusterDescriptor,
    pub data_set_type: DataSetType,
    /// Target keyspace of CQL datasets; legacy datasets name their own
    pub keyspace: String,
    pub locations: Vec<String>,
    #[serde(default)]
    pub options: LoadingOption,
}

impl LoadRequest {
    pub fn new(
        cluster: ClusterDescriptor,
        data_set_type: DataSetType,
        locations: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            cluster,
            data_set_type,
            keyspace: DEFAULT_KEYSPACE.to_string(),
            locations: locations.into_iter().map(Into::into).collect(),
            options: LoadingOption::default(),
        }
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = keyspace.into();
        self
    }

    pub fn with_options(mut self, options: LoadingOption) -> Self {
        self.options = options;
        self
    }

    /// Checks done before any server call
    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        if self.data_set_type == DataSetType::Cql && self.keyspace.trim().is_empty() {
            return Err(Error::configuration("keyspace must not be empty for a cql dataset"));
        }
        if let Some(blank) = self.locations.iter().find(|l| l.trim().is_empty()) {
            return Err(Error::configuration(format!("invalid dataset location '{}'", blank)));
        }
        Ok(())
    }
}

/// Loading procedure of one kind of dataset
#[async_trait]
pub trait DataSetStrategy: Send + Sync {
    async fn load(
        &self,
        server: &dyn CassandraServer,
        resources: &dyn ResourceProvider,
        request: &LoadRequest,
    ) -> Result<()>;
}

impl DataSetType {
    pub fn strategy(self) -> &'static dyn DataSetStrategy {
        match self {
            DataSetType::Cql => &CqlStrategy,
            DataSetType::Legacy => &LegacyStrategy,
        }
    }
}

/// Load the request's datasets, in order
pub async fn load(
    server: &dyn CassandraServer,
    resources: &dyn ResourceProvider,
    request: &LoadRequest,
) -> Result<()> {
    request.validate()?;
    if request.locations.is_empty() {
        log::info!("No dataset will be loaded");
        return Ok(());
    }
    log::debug!(
        "Loading {} {:?} dataset(s) into {}",
        request.locations.len(),
        request.data_set_type,
        request.cluster.address()
    );
    request
        .data_set_type
        .strategy()
        .load(server, resources, request)
        .await
}
