//! Error types for cassandra-unit

use thiserror::Error;

use crate::driver::DriverError;

/// Result type alias for cassandra-unit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cassandra-unit operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid test configuration, malformed connection parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A dataset resource could not be found
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// A dataset file could not be parsed
    #[error("Dataset error: {0}")]
    DataSet(String),

    /// The driver rejected a statement or the connection failed
    #[error("Load error: {0}")]
    Load(#[from] DriverError),

    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a resource not found error
    pub fn resource_not_found(msg: impl Into<String>) -> Self {
        Self::ResourceNotFound(msg.into())
    }

    /// Create a dataset error
    pub fn data_set(msg: impl Into<String>) -> Self {
        Self::DataSet(msg.into())
    }

    /// The driver error behind a load failure, if any
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Error::Load(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this error must abort test setup.
    ///
    /// Only a missing resource is tolerated, and only by callers that treat
    /// "no dataset" as a valid outcome.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::ResourceNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::DataSet(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::DataSet(err.to_string())
    }
}
