//! Field-level parsing and validation shared by the spreadsheet and
//! statement parsers.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use super::imports_model::ParsedTransaction;
use crate::constants::{RATE_DECIMAL_PLACES, USD_DECIMAL_PLACES};
use crate::records::PricingSource;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const CURRENCY_SYMBOLS: [char; 6] = ['$', '€', '£', '¥', '₹', '\u{a0}'];

/// Textual fields of one row before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub title: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub date: Option<String>,
    pub exchange_rate: Option<String>,
    pub amount_usd: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// A row whose mandatory fields passed validation. Pricing may still be
/// incomplete.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub title: String,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub exchange_rate: Option<Decimal>,
    pub amount_usd: Option<Decimal>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Cross-derived exchange rate and USD amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub exchange_rate: Decimal,
    pub amount_usd: Decimal,
    pub source: PricingSource,
}

/// Validates the mandatory fields of a row.
///
/// The error is the reason the row is skipped, without a row prefix.
pub fn validate_row(raw: RawRow) -> std::result::Result<ValidatedRow, String> {
    let title = non_blank(raw.title).ok_or_else(|| "missing title".to_string())?;

    let amount_text = non_blank(raw.amount).ok_or_else(|| "missing amount".to_string())?;
    let amount = parse_amount(&amount_text)
        .ok_or_else(|| format!("invalid amount '{}'", amount_text))?;
    if amount <= Decimal::ZERO {
        return Err(format!("amount must be positive, got '{}'", amount_text));
    }

    let currency_text = non_blank(raw.currency).unwrap_or_default();
    let currency = parse_currency(&currency_text)
        .ok_or_else(|| format!("invalid currency '{}'", currency_text))?;

    let date_text = non_blank(raw.date).ok_or_else(|| "missing date".to_string())?;
    let date = parse_date(&date_text).ok_or_else(|| format!("invalid date '{}'", date_text))?;

    let exchange_rate = optional_decimal(raw.exchange_rate, "exchange rate")?;
    let amount_usd = optional_decimal(raw.amount_usd, "USD amount")?;

    Ok(ValidatedRow {
        title,
        amount,
        currency,
        date,
        exchange_rate,
        amount_usd,
        location: non_blank(raw.location),
        description: non_blank(raw.description),
        category: non_blank(raw.category),
    })
}

/// Derives the missing half of (rate, USD amount).
///
/// Returns `None` for a foreign-currency row that carries neither value.
/// The rate is expressed as units of the row currency per one USD.
pub fn derive_pricing(row: &ValidatedRow, base_currency: &str) -> Option<Pricing> {
    if row.currency == base_currency {
        return Some(Pricing {
            exchange_rate: Decimal::ONE,
            amount_usd: round_usd(row.amount),
            source: PricingSource::BaseCurrency,
        });
    }

    let (exchange_rate, amount_usd) = match (row.exchange_rate, row.amount_usd) {
        (Some(rate), Some(usd)) => (rate, usd),
        (Some(rate), None) => (rate, row.amount / rate),
        (None, Some(usd)) => (row.amount / usd, usd),
        (None, None) => return None,
    };

    Some(Pricing {
        exchange_rate: round_rate(exchange_rate),
        amount_usd: round_usd(amount_usd),
        source: PricingSource::File,
    })
}

/// Prices a row with a rate obtained elsewhere (e.g. a rate resolver).
pub fn price_with_rate(row: &ValidatedRow, rate: Decimal, source: PricingSource) -> Pricing {
    Pricing {
        exchange_rate: round_rate(rate),
        amount_usd: round_usd(row.amount / rate),
        source,
    }
}

impl ValidatedRow {
    pub fn into_transaction(self, pricing: Option<Pricing>) -> ParsedTransaction {
        ParsedTransaction {
            title: self.title,
            amount: self.amount,
            currency: self.currency,
            exchange_rate: pricing.map(|p| p.exchange_rate),
            amount_usd: pricing.map(|p| p.amount_usd),
            date: self.date,
            location: self.location,
            description: self.description,
            category: self.category,
            pricing_source: pricing.map_or(PricingSource::Missing, |p| p.source),
        }
    }
}

/// Parses a monetary amount, tolerating currency symbols, thousands
/// separators, a decimal comma and scientific notation.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.contains('.')) {
        (Some(_), true) => cleaned.replace(',', ""),
        (Some(pos), false) => {
            let decimals = cleaned.len() - pos - 1;
            if cleaned.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, _) => cleaned,
    };

    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// Parses a calendar day. Times of day are dropped.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_TIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Returns the uppercase code when `raw` is exactly three ASCII letters.
pub fn parse_currency(raw: &str) -> Option<String> {
    let code = raw.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

pub fn round_usd(value: Decimal) -> Decimal {
    value.round_dp(USD_DECIMAL_PLACES)
}

pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp(RATE_DECIMAL_PLACES)
}

fn optional_decimal(
    raw: Option<String>,
    field: &str,
) -> std::result::Result<Option<Decimal>, String> {
    let Some(text) = non_blank(raw) else {
        return Ok(None);
    };
    match parse_amount(&text) {
        Some(value) if value > Decimal::ZERO => Ok(Some(value)),
        _ => Err(format!("{} must be a positive number, got '{}'", field, text)),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
