//! Expensa Core - bulk transaction ingestion for the expense tracker.
//!
//! This crate contains the import queue, the spreadsheet and statement
//! parsers, the finalizer and the amortization splitter. It is
//! database-agnostic: job and record storage, rate lookups and the
//! statement-processing service are reached through traits.

pub mod constants;
pub mod errors;
pub mod fx;
pub mod imports;
pub mod records;

#[cfg(test)]
mod test_support;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
