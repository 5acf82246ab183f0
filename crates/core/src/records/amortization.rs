//! Amortization splitter.
//!
//! Divides one amount into monthly installments whose cents add up exactly
//! to the original total. The native amount and the USD amount are rounded
//! independently, so their extra cents may land on different periods.

use chrono::{Months, NaiveDate};
use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::records_errors::RecordError;
use super::records_model::NewFinancialRecord;
use crate::constants::MINOR_UNITS_PER_MAJOR;
use crate::errors::{Error, ValidationError};
use crate::Result;

/// One period of an amortized amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Installment {
    /// 1-based position within the split.
    pub sequence: u32,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub amount_usd: Decimal,
}

/// Splits both amounts over `periods` months starting at `start_date`.
///
/// The first `remainder` periods receive one extra cent.
pub fn split(
    start_date: NaiveDate,
    total_amount: Decimal,
    total_amount_usd: Decimal,
    periods: u32,
) -> Result<Vec<Installment>> {
    if periods == 0 {
        return Err(RecordError::InvalidPeriods(periods).into());
    }

    let native_parts = distribute_cents(to_cents(total_amount)?, periods);
    let usd_parts = distribute_cents(to_cents(total_amount_usd)?, periods);

    native_parts
        .into_iter()
        .zip(usd_parts)
        .enumerate()
        .map(|(i, (native, usd))| {
            let offset = i as u32;
            Ok(Installment {
                sequence: offset + 1,
                date: add_months_clamped(start_date, offset)?,
                amount: from_cents(native),
                amount_usd: from_cents(usd),
            })
        })
        .collect()
}

/// Adds calendar months, clamping to the last day of the target month.
///
/// Jan 31 + 1 month is Feb 29 in a leap year and Feb 28 otherwise,
/// never a day in March.
pub fn add_months_clamped(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months)).ok_or_else(|| {
        Error::Validation(ValidationError::InvalidInput(format!(
            "{} plus {} months is outside the supported date range",
            date, months
        )))
    })
}

/// Builds the children of an amortized parent, titled `"Title (i/N)"`.
pub fn installment_records(
    parent: &NewFinancialRecord,
    periods: u32,
) -> Result<Vec<NewFinancialRecord>> {
    let installments = split(parent.date, parent.amount, parent.amount_usd, periods)?;

    Ok(installments
        .into_iter()
        .map(|installment| NewFinancialRecord {
            id: NewFinancialRecord::generate_id(),
            title: installment_title(&parent.title, installment.sequence, periods),
            amount: installment.amount,
            amount_usd: installment.amount_usd,
            date: installment.date,
            parent_id: Some(parent.id.clone()),
            split_index: Some(installment.sequence),
            split_total: Some(periods),
            is_split_parent: false,
            amortization_periods: None,
            ..parent.clone()
        })
        .collect())
}

pub fn installment_title(title: &str, sequence: u32, periods: u32) -> String {
    format!("{} ({}/{})", title.trim(), sequence, periods)
}

fn to_cents(amount: Decimal) -> Result<i64> {
    amount
        .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
        .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| RecordError::AmountOutOfRange(amount.to_string()).into())
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn distribute_cents(total_cents: i64, periods: u32) -> Vec<i64> {
    let periods = i64::from(periods);
    let base = total_cents.div_euclid(periods);
    let remainder = total_cents - base * periods;

    (0..periods)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}
