use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the log file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The log file is not a JSON array of records.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
