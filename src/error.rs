use crate::index::IndexLocation;
use thiserror::Error;

/// Errors raised by the container and the feature index subsystem
#[derive(Error, Debug)]
pub enum IndexError {
    /// Container has been closed
    #[error("Container is closed")]
    ContainerClosed,
    /// Lock acquisition failed
    #[error("Failed to acquire lock: {0}")]
    Lock(String),
    /// Feature table does not exist
    #[error("Feature table not found: {0}")]
    TableNotFound(String),
    /// Feature table already exists
    #[error("Feature table already exists: {0}")]
    TableExists(String),
    /// Feature row does not exist
    #[error("Feature row not found: {table}:{id}")]
    RowNotFound { table: String, id: i64 },
    /// Index location cannot be used with this container
    #[error("Index location {0} is not supported by this container")]
    Unsupported(IndexLocation),
    /// Index mutation requested while no index location is selected
    #[error("No index location selected")]
    NoIndexLocation,
    /// Envelope bounds are inverted or not finite
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
    /// Geometry blob could not be decoded
    #[error("Geometry error: {0}")]
    Geometry(String),
    /// No transformation exists between two projections
    #[error("Projection error: {0}")]
    Projection(String),
    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),
    /// Snapshot serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// I/O error from the persistence layer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "persistence")]
impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;
