use miette::Diagnostic;
use thiserror::Error;

/// Storage error type for the PodAllocation record store.
#[derive(Error, Debug, Diagnostic)]
pub enum StorageError {
    #[error("record not found: {name}")]
    #[diagnostic(
        code(mbcas::storage::not_found),
        help("the record may have already been garbage-collected")
    )]
    NotFound { name: String },

    #[error("database error: {message}")]
    #[diagnostic(
        code(mbcas::storage::database_error),
        help("check that the data directory is writable and not corrupted")
    )]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("conflict writing {name}: expected generation {expected:?}, found {found}")]
    #[diagnostic(
        code(mbcas::storage::conflict),
        help("re-read the record and retry the write once")
    )]
    Conflict {
        name: String,
        expected: Option<u64>,
        found: u64,
    },

    #[error("serialization error: {message}")]
    #[diagnostic(code(mbcas::storage::serialization_error), help("the stored record is malformed"))]
    SerializationError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn conflict(name: impl Into<String>, expected: Option<u64>, found: u64) -> Self {
        Self::Conflict {
            name: name.into(),
            expected,
            found,
        }
    }

    pub fn database_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source,
        }
    }

    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}

impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::database_error(format!("redb error: {}", err), Some(Box::new(err)))
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::database_error(format!("transaction error: {}", err), Some(Box::new(err)))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::database_error(format!("storage error: {}", err), Some(Box::new(err)))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::database_error(format!("table error: {}", err), Some(Box::new(err)))
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::database_error(format!("commit error: {}", err), Some(Box::new(err)))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization_error(format!("JSON error: {}", err), Some(Box::new(err)))
    }
}
