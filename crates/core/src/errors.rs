//! Error types shared by every module of the ingestion pipeline.

use thiserror::Error;

use crate::imports::ImportError;
use crate::records::RecordError;

pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the ingestion pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Import(#[from] ImportError),

    #[error("{0}")]
    Record(#[from] RecordError),

    #[error("Exchange rate lookup failed: {0}")]
    Fx(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Missing configuration key: {0}")]
    MissingConfigKey(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Stable code the request layer maps onto its own status codes.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Import(e) => e.code(),
            Error::Record(e) => e.code(),
            Error::Validation(_) => "BAD_REQUEST",
            Error::Database(DatabaseError::NotFound(_)) => "NOT_FOUND",
            _ => "INTERNAL",
        }
    }
}

/// Failures reported by job and record stores.
///
/// Store implementations map their driver errors onto these variants so the
/// core never sees driver types.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    UniqueViolation(String),

    /// An atomic multi-row write (split parent and children) was rolled back.
    #[error("Atomic write rolled back: {0}")]
    TransactionFailed(String),
}

/// Input that cannot be turned into a domain value.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{0}")]
    InvalidInput(String),
}
