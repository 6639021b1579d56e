//! Driver seam
//!
//! The loaders never talk to a server directly. CQL datasets go through a
//! [`CqlSession`], legacy datasets through a [`LegacyClient`] issuing typed
//! schema and mutation calls. Two implementations ship with the crate:
//! [`cqlsh`] runs everything through `cqlsh` inside a Cassandra container, and
//! [`memory`] is an in-process double used by the tests.

pub mod cqlsh;
pub mod memory;

pub use cqlsh::{CqlLegacyClient, CqlshSession};
pub use memory::MemoryCluster;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ColumnFamilyDefinition, KeyspaceDefinition, Value};

/// Errors surfaced by a driver, passed to callers unchanged
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The server rejected the request (syntax, unknown keyspace, already exists...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request did not complete in time
    #[error("request timed out: {0}")]
    Timeout(String),
}

impl DriverError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

/// A session executing CQL statements one at a time
#[async_trait]
pub trait CqlSession: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<(), DriverError>;

    /// Run a statement and return its rows as text cells
    async fn query(&self, statement: &str) -> Result<Vec<Vec<String>>, DriverError>;
}

#[async_trait]
impl<S: CqlSession + ?Sized> CqlSession for Box<S> {
    async fn execute(&self, statement: &str) -> Result<(), DriverError> {
        (**self).execute(statement).await
    }

    async fn query(&self, statement: &str) -> Result<Vec<Vec<String>>, DriverError> {
        (**self).query(statement).await
    }
}

/// Unquoted CQL identifiers are case-insensitive, quoted ones kept as written
pub(crate) fn identifier(raw: &str) -> String {
    let raw = raw.trim();
    match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => raw.to_ascii_lowercase(),
    }
}

/// Quote a case-sensitive name for CQL
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A single write against a column family of the legacy model
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert {
        column_family: String,
        key: Value,
        super_column: Option<Value>,
        name: Value,
        value: Value,
    },
    Increment {
        column_family: String,
        key: Value,
        super_column: Option<Value>,
        name: Value,
        delta: i64,
    },
}

impl Mutation {
    pub fn column_family(&self) -> &str {
        match self {
            Mutation::Insert { column_family, .. } | Mutation::Increment { column_family, .. } => {
                column_family
            }
        }
    }
}

/// Typed schema and data calls of the legacy (column family) model
#[async_trait]
pub trait LegacyClient: Send + Sync {
    async fn keyspace_exists(&self, keyspace: &str) -> Result<bool, DriverError>;

    async fn column_family_exists(&self, keyspace: &str, column_family: &str) -> Result<bool, DriverError>;

    async fn drop_keyspace(&self, keyspace: &str) -> Result<(), DriverError>;

    async fn add_keyspace(&self, definition: &KeyspaceDefinition) -> Result<(), DriverError>;

    async fn add_column_family(
        &self,
        keyspace: &str,
        definition: &ColumnFamilyDefinition,
    ) -> Result<(), DriverError>;

    async fn apply(&self, keyspace: &str, mutation: Mutation) -> Result<(), DriverError>;
}

#[async_trait]
impl<C: LegacyClient + ?Sized> LegacyClient for Box<C> {
    async fn keyspace_exists(&self, keyspace: &str) -> Result<bool, DriverError> {
        (**self).keyspace_exists(keyspace).await
    }

    async fn column_family_exists(&self, keyspace: &str, column_family: &str) -> Result<bool, DriverError> {
        (**self).column_family_exists(keyspace, column_family).await
    }

    async fn drop_keyspace(&self, keyspace: &str) -> Result<(), DriverError> {
        (**self).drop_keyspace(keyspace).await
    }

    async fn add_keyspace(&self, definition: &KeyspaceDefinition) -> Result<(), DriverError> {
        (**self).add_keyspace(definition).await
    }

    async fn add_column_family(
        &self,
        keyspace: &str,
        definition: &ColumnFamilyDefinition,
    ) -> Result<(), DriverError> {
        (**self).add_column_family(keyspace, definition).await
    }

    async fn apply(&self, keyspace: &str, mutation: Mutation) -> Result<(), DriverError> {
        (**self).apply(keyspace, mutation).await
    }
}
