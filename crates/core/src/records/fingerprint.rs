//! Duplicate-detection fingerprints.
//!
//! A fingerprint identifies a transaction by what a user would recognize
//! on a statement: the day, the title, the absolute amount and the currency.
//! Imports that overlap a previous upload produce the same fingerprints.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::records_model::FinancialRecord;

/// Computes `date|title|abs(amount)|CURRENCY`.
pub fn compute_fingerprint(date: NaiveDate, title: &str, amount: Decimal, currency: &str) -> String {
    format!(
        "{}|{}|{}|{}",
        date.format("%Y-%m-%d"),
        title.trim(),
        normalize_amount(amount),
        currency.trim().to_uppercase()
    )
}

pub fn record_fingerprint(record: &FinancialRecord) -> String {
    compute_fingerprint(record.date, &record.title, record.amount, &record.currency)
}

/// 12.50 and 12.5 must fingerprint identically.
fn normalize_amount(amount: Decimal) -> String {
    amount.abs().normalize().to_string()
}
