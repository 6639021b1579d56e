//! Test lifecycle listener for cassandra-unit
//!
//! Before each test the listener starts Cassandra (once per process) and
//! loads the datasets the test declares; after it, every user keyspace is
//! dropped.

pub mod config;
pub mod context;
pub mod listener;

pub use crate::{
    config::{CassandraDataSet, EmbeddedCassandra},
    context::{CassandraUnitTest, TestContext},
    listener::{CassandraUnitListener, CleanupPolicy, TestExecutionListener},
};
