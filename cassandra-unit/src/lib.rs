//! cassandra-unit
//!
//! Test support for Cassandra: start a server once per process, load CQL or
//! legacy JSON/YAML datasets into it before a test and drop every user
//! keyspace afterwards.
//!
//! The server is only reached through the [`driver::CqlSession`] and
//! [`driver::LegacyClient`] seams. [`embedded::DockerCassandra`] drives a
//! Cassandra container through `cqlsh`; [`driver::MemoryCluster`] is an
//! in-memory double recording schema and rows.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dataset;
pub mod driver;
pub mod embedded;
pub mod error;
pub mod loader;
pub mod logging;
pub mod model;
pub mod resource;

// Re-export main types for convenience
pub use crate::{
    config::CassandraUnitConfig,
    dataset::CqlDataSet,
    driver::{CqlSession, DriverError, LegacyClient, MemoryCluster},
    embedded::{CassandraServer, DockerCassandra, EmbeddedServer, ServerConfig, StartGuard},
    error::{Error, Result},
    loader::{load, LoadRequest},
    model::{ClusterDescriptor, DataSetType, LoadingOption, StrategyModel},
    resource::{locate, ClasspathResources, ResourceProvider, TestClass},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
