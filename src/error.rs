//! Error types for the term dictionary engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Bad magic, truncated stream or a range pointing outside the file.
    /// A dictionary that fails with this error cannot be used.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Arithmetic overflow while re-encoding postings for `name`.
    #[error("Overflow while encoding entry {name}: {detail}")]
    Overflow { name: String, detail: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl StorageError {
    /// True for format errors detected while opening a dictionary
    pub fn is_corruption(&self) -> bool {
        matches!(self, StorageError::Corruption(_))
    }

    /// Attach an entry name to an overflow raised deep inside postings code
    pub(crate) fn with_entry_name(self, name: impl Into<String>) -> Self {
        match self {
            StorageError::Overflow { detail, .. } => StorageError::Overflow {
                name: name.into(),
                detail,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
