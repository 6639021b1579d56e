//! CQL dataset loading

use async_trait::async_trait;

use crate::dataset::CqlDataSet;
use crate::driver::CqlSession;
use crate::embedded::CassandraServer;
use crate::error::Result;
use crate::loader::{DataSetStrategy, LoadRequest};
use crate::resource::ResourceProvider;

/// Runs CQL datasets statement by statement on one session
pub struct CqlDataLoader<S> {
    session: S,
}

impl<S: CqlSession> CqlDataLoader<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub async fn load(&self, data_set: &CqlDataSet) -> Result<()> {
        if let Some(keyspace) = data_set.keyspace() {
            log::debug!(
                "Loading {} statement(s) into keyspace {} (recreate: {})",
                data_set.statements().len(),
                keyspace,
                data_set.is_keyspace_creation()
            );
        }
        for statement in data_set.execution_plan() {
            log::trace!("Executing: {}", statement);
            self.session.execute(&statement).await?;
        }
        Ok(())
    }
}

/// Strategy for [`crate::model::DataSetType::Cql`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CqlStrategy;

#[async_trait]
impl DataSetStrategy for CqlStrategy {
    async fn load(
        &self,
        server: &dyn CassandraServer,
        resources: &dyn ResourceProvider,
        request: &LoadRequest,
    ) -> Result<()> {
        let data_sets = request
            .locations
            .iter()
            .enumerate()
            .map(|(index, location)| {
                CqlDataSet::from_resource(resources, location)
                    .map(|data_set| data_set.in_keyspace(request.keyspace.clone(), index == 0))
            })
            .collect::<Result<Vec<_>>>()?;

        let loader = CqlDataLoader::new(server.cql_session(&request.cluster).await?);
        for (data_set, location) in data_sets.iter().zip(&request.locations) {
            log::info!("Loading cql dataset {}", location);
            loader.load(data_set).await?;
        }
        Ok(())
    }
}
