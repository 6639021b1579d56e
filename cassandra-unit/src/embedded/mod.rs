//! Server lifecycle
//!
//! A [`CassandraServer`] is started at most once per process through a
//! [`StartGuard`], handed out sessions and clients for the loaders, and
//! cleaned between tests.

pub mod docker;

pub use docker::{DockerCassandra, DockerSettings};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::driver::{CqlSession, LegacyClient};
use crate::error::{Error, Result};
use crate::model::ClusterDescriptor;

/// Configuration file name used when none is given
pub const DEFAULT_CONFIGURATION: &str = "cu-cassandra.yaml";

/// How the server is started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Cassandra configuration file handed to the server
    pub configuration_file: PathBuf,
    pub startup_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            configuration_file: PathBuf::from(DEFAULT_CONFIGURATION),
            startup_timeout_seconds: 120,
        }
    }
}

impl ServerConfig {
    pub fn with_configuration(configuration_file: impl Into<PathBuf>) -> Self {
        Self {
            configuration_file: configuration_file.into(),
            ..Self::default()
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.configuration_file.as_os_str().is_empty() {
            return Err(Error::configuration("server configuration file must not be empty"));
        }
        if self.startup_timeout_seconds == 0 {
            return Err(Error::configuration("server startup timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// A Cassandra instance tests can load data into
#[async_trait]
pub trait CassandraServer: Send + Sync {
    /// Start the server and wait until it answers
    async fn start(&self, config: &ServerConfig) -> Result<()>;

    /// Drop every keyspace that is not a system keyspace
    async fn clean(&self) -> Result<()>;

    async fn cql_session(&self, cluster: &ClusterDescriptor) -> Result<Box<dyn CqlSession>>;

    async fn legacy_client(&self, cluster: &ClusterDescriptor) -> Result<Box<dyn LegacyClient>>;
}

/// Exactly-once server start.
///
/// Concurrent first callers wait for the same start. A failed start leaves
/// the guard unset, so the next call tries again.
#[derive(Debug, Default)]
pub struct StartGuard {
    started: OnceCell<()>,
}

impl StartGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started.initialized()
    }

    pub async fn start(&self, server: &dyn CassandraServer, config: &ServerConfig) -> Result<()> {
        self.started
            .get_or_try_init(|| async {
                log::info!(
                    "Starting Cassandra with configuration {}",
                    config.configuration_file.display()
                );
                server.start(config).await
            })
            .await?;
        Ok(())
    }
}

static PROCESS_START_GUARD: Lazy<Arc<StartGuard>> = Lazy::new(|| Arc::new(StartGuard::new()));

/// The start guard shared by the whole process
pub fn process_start_guard() -> Arc<StartGuard> {
    Arc::clone(&PROCESS_START_GUARD)
}

/// A server paired with the guard controlling its start
#[derive(Clone)]
pub struct EmbeddedServer {
    server: Arc<dyn CassandraServer>,
    guard: Arc<StartGuard>,
}

impl EmbeddedServer {
    /// Server started through the process-wide guard
    pub fn new(server: Arc<dyn CassandraServer>) -> Self {
        Self::with_guard(server, process_start_guard())
    }

    pub fn with_guard(server: Arc<dyn CassandraServer>, guard: Arc<StartGuard>) -> Self {
        Self { server, guard }
    }

    pub fn server(&self) -> &Arc<dyn CassandraServer> {
        &self.server
    }

    pub fn is_started(&self) -> bool {
        self.guard.is_started()
    }

    /// Start the server unless this guard already did
    pub async fn start(&self, config: &ServerConfig) -> Result<()> {
        config.validate()?;
        self.guard.start(self.server.as_ref(), config).await
    }

    pub async fn clean(&self) -> Result<()> {
        log::debug!("Cleaning Cassandra keyspaces");
        self.server.clean().await
    }
}

impl std::fmt::Debug for EmbeddedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedServer")
            .field("started", &self.guard.is_started())
            .finish()
    }
}
