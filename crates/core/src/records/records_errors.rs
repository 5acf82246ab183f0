use thiserror::Error;

/// Errors raised by record operations outside the import flow.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record {0} not found")]
    NotFound(String),

    #[error("Record {0} belongs to another user")]
    NotOwner(String),

    #[error("Record {0} is not an amortized parent")]
    NotSplitParent(String),

    #[error("Amortization needs at least one period, got {0}")]
    InvalidPeriods(u32),

    #[error("Amount {0} cannot be expressed in whole cents")]
    AmountOutOfRange(String),
}

impl RecordError {
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::NotFound(_) => "NOT_FOUND",
            RecordError::NotOwner(_) => "FORBIDDEN",
            RecordError::NotSplitParent(_)
            | RecordError::InvalidPeriods(_)
            | RecordError::AmountOutOfRange(_) => "BAD_REQUEST",
        }
    }
}
