//! Per-test configuration
//!
//! [`EmbeddedCassandra`] says which server a test needs; [`CassandraDataSet`]
//! says what to load into it. Both default to the values tests most often
//! use, so an empty configuration is a valid one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cassandra_unit::embedded::DEFAULT_CONFIGURATION;
use cassandra_unit::loader::DEFAULT_KEYSPACE;
use cassandra_unit::{ClusterDescriptor, DataSetType, LoadingOption, Result, ServerConfig};

/// Server a test runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedCassandra {
    /// Cassandra configuration file
    pub configuration: PathBuf,
    pub cluster_name: String,
    pub host: String,
    pub port: u16,
}

impl Default for EmbeddedCassandra {
    fn default() -> Self {
        Self {
            configuration: PathBuf::from(DEFAULT_CONFIGURATION),
            cluster_name: "Test Cluster".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9142,
        }
    }
}

impl EmbeddedCassandra {
    pub fn with_configuration(mut self, configuration: impl Into<PathBuf>) -> Self {
        self.configuration = configuration.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Validated connection target
    pub fn cluster(&self) -> Result<ClusterDescriptor> {
        ClusterDescriptor::new(self.cluster_name.clone(), self.host.clone(), self.port)
    }

    pub fn server_config(&self, startup_timeout_seconds: u64) -> ServerConfig {
        ServerConfig {
            configuration_file: self.configuration.clone(),
            startup_timeout_seconds,
        }
    }
}

/// Datasets loaded before each test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CassandraDataSet {
    /// Resource locations, in load order. Empty means "look the dataset up
    /// from the test's name".
    pub locations: Vec<String>,
    /// Keyspace CQL datasets are loaded into
    pub keyspace: String,
    #[serde(rename = "type")]
    pub data_set_type: DataSetType,
    pub options: LoadingOption,
}

impl Default for CassandraDataSet {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            keyspace: DEFAULT_KEYSPACE.to_string(),
            data_set_type: DataSetType::Cql,
            options: LoadingOption::default(),
        }
    }
}

impl CassandraDataSet {
    pub fn new(locations: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            locations: locations.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, data_set_type: DataSetType) -> Self {
        self.data_set_type = data_set_type;
        self
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = keyspace.into();
        self
    }

    pub fn with_options(mut self, options: LoadingOption) -> Self {
        self.options = options;
        self
    }
}
