use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole chunk. Never merged into a [`crate::ProgressReport`].
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Not a CSV file: {}", .0.display())]
    NotCsv(PathBuf),
    #[error("Malformed header: {0}")]
    MalformedHeader(String),
    #[error("Invalid import job: {0}")]
    InvalidJob(String),
    #[error("Unknown import job: {0}")]
    UnknownJob(String),
    #[error("No schema registered for table '{0}'")]
    UnknownTable(String),
    #[error("Destination table unreachable: {0}")]
    TableUnreachable(#[source] StorageError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ImportResult<T> = std::result::Result<T, ImportError>;

/// Failures raised by a [`crate::Store`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("no row with {column} = '{value}'")]
    NoMatchingRow { column: String, value: String },
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Why a single field (or a whole row) was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ErrorKind {
    /// Row width differs from the header width.
    ColumnCountMismatch { expected: usize, found: usize },
    /// Value does not satisfy the declared validation class.
    InvalidFormat { value: String, rule: String },
    /// A row with the same value already exists in the destination column.
    DuplicateValue { value: String },
    /// Required field received an empty value.
    MissingRequired,
    /// The record could not be decoded (e.g. invalid UTF-8).
    UnreadableRow { reason: String },
    /// Update targeted an identity that does not exist.
    NoMatchingRow { value: String },
    /// Uniqueness lookup or write failed for this row.
    StorageUnavailable { reason: String },
}

impl From<StorageError> for ErrorKind {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NoMatchingRow { value, .. } => ErrorKind::NoMatchingRow { value },
            other => ErrorKind::StorageUnavailable {
                reason: other.to_string(),
            },
        }
    }
}
