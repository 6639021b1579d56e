//! Test lifecycle listener

use std::sync::Arc;

use async_trait::async_trait;

use cassandra_unit::embedded::{process_start_guard, StartGuard};
use cassandra_unit::{
    load, locate, CassandraServer, CassandraUnitConfig, EmbeddedServer, Error, LoadRequest,
    ResourceProvider, Result,
};

use crate::config::CassandraDataSet;
use crate::context::TestContext;

/// Hooks a test harness calls around test classes and tests
#[async_trait]
pub trait TestExecutionListener: Send + Sync {
    async fn before_test_class(&self, _ctx: &TestContext) -> Result<()> {
        Ok(())
    }

    async fn before_test(&self, ctx: &TestContext) -> Result<()>;

    async fn after_test(&self, ctx: &TestContext) -> Result<()>;

    async fn after_test_class(&self, _ctx: &TestContext) -> Result<()> {
        Ok(())
    }
}

/// When user keyspaces are dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    #[default]
    AfterEachTest,
    AfterTestClass,
}

/// Starts Cassandra once, loads the test's datasets and cleans up after it
pub struct CassandraUnitListener {
    server: EmbeddedServer,
    resources: Arc<dyn ResourceProvider>,
    startup_timeout_seconds: u64,
    cleanup: CleanupPolicy,
}

impl CassandraUnitListener {
    /// Listener sharing the process-wide start guard
    pub fn new(server: Arc<dyn CassandraServer>, resources: Arc<dyn ResourceProvider>) -> Self {
        Self::with_guard(server, resources, process_start_guard())
    }

    pub fn with_guard(
        server: Arc<dyn CassandraServer>,
        resources: Arc<dyn ResourceProvider>,
        guard: Arc<StartGuard>,
    ) -> Self {
        Self {
            server: EmbeddedServer::with_guard(server, guard),
            resources,
            startup_timeout_seconds: cassandra_unit::ServerConfig::default().startup_timeout_seconds,
            cleanup: CleanupPolicy::default(),
        }
    }

    /// Docker backed listener built from a configuration file
    pub fn from_config(config: &CassandraUnitConfig) -> Result<Self> {
        config.validate()?;
        let listener = Self::new(Arc::new(config.docker_server()), Arc::new(config.resources()))
            .with_startup_timeout(config.server.startup_timeout_seconds);
        Ok(listener)
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_startup_timeout(mut self, seconds: u64) -> Self {
        self.startup_timeout_seconds = seconds;
        self
    }

    pub fn server(&self) -> &EmbeddedServer {
        &self.server
    }

    pub fn cleanup(&self) -> CleanupPolicy {
        self.cleanup
    }

    /// Explicit locations, or the dataset named after the test type
    fn data_set_locations(&self, ctx: &TestContext, data_set: &CassandraDataSet) -> Vec<String> {
        if !data_set.locations.is_empty() {
            return data_set.locations.clone();
        }
        data_set
            .data_set_type
            .extensions()
            .iter()
            .find_map(|extension| locate(self.resources.as_ref(), ctx.test_class(), extension))
            .into_iter()
            .collect()
    }

    async fn clean(&self, ctx: &TestContext) -> Result<()> {
        log::debug!("Cleaning Cassandra after {}", ctx.test_class().name());
        self.server.clean().await
    }
}

#[async_trait]
impl TestExecutionListener for CassandraUnitListener {
    async fn before_test(&self, ctx: &TestContext) -> Result<()> {
        let embedded = ctx.embedded_cassandra().ok_or_else(|| {
            Error::configuration(format!(
                "CassandraUnitListener must be used with an EmbeddedCassandra configuration on {}",
                ctx.test_class().name()
            ))
        })?;
        let cluster = embedded.cluster()?;

        self.server
            .start(&embedded.server_config(self.startup_timeout_seconds))
            .await?;

        let data_set = match ctx.data_set() {
            Some(data_set) => data_set,
            None => return Ok(()),
        };
        let request = LoadRequest {
            cluster,
            data_set_type: data_set.data_set_type,
            keyspace: data_set.keyspace.clone(),
            locations: self.data_set_locations(ctx, data_set),
            options: data_set.options.clone(),
        };
        load(self.server.server().as_ref(), self.resources.as_ref(), &request).await
    }

    async fn after_test(&self, ctx: &TestContext) -> Result<()> {
        match self.cleanup {
            CleanupPolicy::AfterEachTest => self.clean(ctx).await,
            CleanupPolicy::AfterTestClass => Ok(()),
        }
    }

    async fn after_test_class(&self, ctx: &TestContext) -> Result<()> {
        match self.cleanup {
            CleanupPolicy::AfterTestClass => self.clean(ctx).await,
            CleanupPolicy::AfterEachTest => Ok(()),
        }
    }
}

impl std::fmt::Debug for CassandraUnitListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CassandraUnitListener")
            .field("server", &self.server)
            .field("cleanup", &self.cleanup)
            .finish()
    }
}
