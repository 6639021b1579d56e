//! Test context handed to the listener hooks

use cassandra_unit::TestClass;

use crate::config::{CassandraDataSet, EmbeddedCassandra};

/// Declares how a test type uses Cassandra.
///
/// Every method has a default: an implementing type gets the default
/// embedded server and loads nothing.
pub trait CassandraUnitTest {
    fn embedded_cassandra() -> Option<EmbeddedCassandra> {
        Some(EmbeddedCassandra::default())
    }

    fn data_set() -> Option<CassandraDataSet> {
        None
    }
}

/// What the listener knows about the running test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestContext {
    test_class: TestClass,
    embedded_cassandra: Option<EmbeddedCassandra>,
    data_set: Option<CassandraDataSet>,
}

impl TestContext {
    /// Context with no configuration at all
    pub fn new(test_class: TestClass) -> Self {
        Self {
            test_class,
            embedded_cassandra: None,
            data_set: None,
        }
    }

    /// Context of a test type declaring its configuration
    pub fn of<T: CassandraUnitTest>() -> Self {
        Self {
            test_class: TestClass::of::<T>(),
            embedded_cassandra: T::embedded_cassandra(),
            data_set: T::data_set(),
        }
    }

    pub fn with_embedded_cassandra(mut self, embedded_cassandra: EmbeddedCassandra) -> Self {
        self.embedded_cassandra = Some(embedded_cassandra);
        self
    }

    pub fn with_data_set(mut self, data_set: CassandraDataSet) -> Self {
        self.data_set = Some(data_set);
        self
    }

    pub fn test_class(&self) -> &TestClass {
        &self.test_class
    }

    pub fn embedded_cassandra(&self) -> Option<&EmbeddedCassandra> {
        self.embedded_cassandra.as_ref()
    }

    pub fn data_set(&self) -> Option<&CassandraDataSet> {
        self.data_set.as_ref()
    }
}
