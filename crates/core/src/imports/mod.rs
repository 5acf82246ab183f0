//! Imports module - bulk transaction ingestion: job queue, parsers and finalizer.

mod csv_reader;
mod field_parsing;
mod finalizer;
mod import_config;
mod imports_constants;
mod imports_errors;
mod imports_model;
mod imports_traits;
mod job_transition;
mod queue_service;
mod spreadsheet_parser;
mod statement_parser;
mod workbook;



pub use field_parsing::{parse_amount, parse_currency, parse_date};
pub use finalizer::{FinalizeSummary, Finalizer};
pub use import_config::*;
pub use imports_constants::*;
pub use imports_errors::ImportError;
pub use imports_model::{
    FinalizeResult, GlobalQueueStats, ImportCounts, ImportJob, ImportJobStatus, ImportKind,
    NewImportJob, ParsedTransaction, QueueStatus, SelectedTransaction, SourceFile,
};
pub use imports_traits::{
    ImportJobRepositoryTrait, ImportQueueServiceTrait, StatementByteStream,
    StatementProcessorTrait,
};
pub use job_transition::{truncate_message, JobTransition};
pub use queue_service::ImportQueueService;
pub use spreadsheet_parser::{parse_spreadsheet, ParseOutcome};
pub use statement_parser::{
    describe_duration, normalize_statement_transactions, read_statement_events, LineBuffer,
    StatementEvent, StatementObserver, StatementParser, StatementTransaction,
};
pub use workbook::{excel_serial_to_date, is_workbook};
