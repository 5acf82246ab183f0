use thiserror::Error;

use super::imports_model::ImportJobStatus;

/// Errors raised by the import queue, its parsers and the finalizer.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("File is {size} bytes, which exceeds the {max} byte upload limit")]
    FileTooLarge { size: u64, max: u64 },

    #[error("You already have {limit} imports waiting or in progress. Wait for one to finish before uploading another.")]
    TooManyPendingJobs { limit: usize },

    #[error("Import job {0} not found")]
    JobNotFound(String),

    #[error("Import job {0} belongs to another user")]
    NotJobOwner(String),

    #[error("Import job is {actual}, but this action requires {expected}")]
    InvalidState {
        expected: String,
        actual: ImportJobStatus,
    },

    #[error("{0}")]
    Parse(String),

    #[error("Statement processing failed: {0}")]
    StatementService(String),

    #[error("Statement processing timed out after {elapsed}. The file may be too large; try uploading a shorter statement period.")]
    StatementTimeout { elapsed: String },

    #[error("Row {row} is missing its {field}; re-run the import before finalizing")]
    MissingDerivedValue { row: usize, field: &'static str },

    #[error("Import job {0} is already being finalized")]
    FinalizeInProgress(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
}

impl ImportError {
    pub fn invalid_state(expected: impl Into<String>, actual: ImportJobStatus) -> Self {
        ImportError::InvalidState {
            expected: expected.into(),
            actual,
        }
    }

    /// Stable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::FileTooLarge { .. }
            | ImportError::TooManyPendingJobs { .. }
            | ImportError::InvalidState { .. }
            | ImportError::FinalizeInProgress(_)
            | ImportError::InvalidSelection(_) => "BAD_REQUEST",
            ImportError::JobNotFound(_) => "NOT_FOUND",
            ImportError::NotJobOwner(_) => "FORBIDDEN",
            ImportError::Parse(_) | ImportError::MissingDerivedValue { .. } => "UNPROCESSABLE",
            ImportError::StatementService(_) => "BAD_GATEWAY",
            ImportError::StatementTimeout { .. } => "GATEWAY_TIMEOUT",
        }
    }
}
