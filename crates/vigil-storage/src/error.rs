use vigil_common::MetricError;

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use vigil_common::MetricError;
/// use vigil_storage::StorageError;
///
/// let err = StorageError::from(MetricError::Validation("metric id is empty".into()));
/// assert!(err.to_string().contains("metric id is empty"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The metric was rejected before reaching the backend.
    #[error("Storage: {0}")]
    Invalid(#[from] MetricError),

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Reading or writing the snapshot file failed.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A metric could not be encoded for the snapshot file.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A snapshot line could not be decoded during restore.
    #[error("Storage: corrupt snapshot line {line}: {source}")]
    Snapshot {
        line: usize,
        source: serde_json::Error,
    },

    /// A bounded operation did not finish in time.
    #[error("Storage: {operation} timed out")]
    Timeout { operation: &'static str },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
