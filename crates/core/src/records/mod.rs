//! Records module - persisted expenses, fingerprints and amortization.

pub mod amortization;
mod fingerprint;
mod records_errors;
mod records_model;
mod records_service;
mod records_traits;


pub use amortization::{add_months_clamped, installment_records, split, Installment};
pub use fingerprint::{compute_fingerprint, record_fingerprint};
pub use records_errors::RecordError;
pub use records_model::{FinancialRecord, NewFinancialRecord, PricingSource};
pub use records_service::RecordService;
pub use records_traits::{FinancialRecordRepositoryTrait, RecordServiceTrait};
