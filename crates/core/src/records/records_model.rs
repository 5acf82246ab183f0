//! Financial record domain models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fx::RateKind;

/// Where the exchange rate of a transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingSource {
    /// Transaction is already in the base currency (rate = 1).
    #[default]
    BaseCurrency,
    /// Rate or base amount supplied by the uploaded file or statement service.
    File,
    /// Rate resolved for the transaction day.
    Historical,
    /// Most recent rate used because the day had none.
    Latest,
    /// No rate could be found; the row cannot be finalized as-is.
    Missing,
}

impl From<RateKind> for PricingSource {
    fn from(kind: RateKind) -> Self {
        match kind {
            RateKind::Historical => PricingSource::Historical,
            RateKind::Latest => PricingSource::Latest,
        }
    }
}

/// A persisted expense owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub amount: Decimal,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub amount_usd: Decimal,
    pub date: NaiveDate,
    pub location: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub pricing_source: PricingSource,
    pub import_job_id: Option<String>,

    // Amortization
    pub parent_id: Option<String>,
    pub split_index: Option<u32>,
    pub split_total: Option<u32>,
    #[serde(default)]
    pub is_split_parent: bool,
    pub amortization_periods: Option<u32>,

    pub created_at: DateTime<Utc>,
}

/// Input model for creating a record.
///
/// Identifiers are assigned by the core so split children can reference
/// their parent before anything is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFinancialRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub amount: Decimal,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub amount_usd: Decimal,
    pub date: NaiveDate,
    pub location: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub pricing_source: PricingSource,
    pub import_job_id: Option<String>,
    pub parent_id: Option<String>,
    pub split_index: Option<u32>,
    pub split_total: Option<u32>,
    #[serde(default)]
    pub is_split_parent: bool,
    pub amortization_periods: Option<u32>,
}

impl NewFinancialRecord {
    pub fn generate_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// Turns this record into the synthetic parent of an `periods`-way split.
    pub fn into_split_parent(mut self, periods: u32) -> Self {
        self.is_split_parent = true;
        self.amortization_periods = Some(periods);
        self.parent_id = None;
        self.split_index = None;
        self.split_total = None;
        self
    }

    /// Materializes the record with a creation timestamp, as a store would.
    pub fn into_record(self, created_at: DateTime<Utc>) -> FinancialRecord {
        FinancialRecord {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            amount: self.amount,
            currency: self.currency,
            exchange_rate: self.exchange_rate,
            amount_usd: self.amount_usd,
            date: self.date,
            location: self.location,
            description: self.description,
            category: self.category,
            pricing_source: self.pricing_source,
            import_job_id: self.import_job_id,
            parent_id: self.parent_id,
            split_index: self.split_index,
            split_total: self.split_total,
            is_split_parent: self.is_split_parent,
            amortization_periods: self.amortization_periods,
            created_at,
        }
    }
}

impl From<&FinancialRecord> for NewFinancialRecord {
    fn from(record: &FinancialRecord) -> Self {
        Self {
            id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            title: record.title.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            exchange_rate: record.exchange_rate,
            amount_usd: record.amount_usd,
            date: record.date,
            location: record.location.clone(),
            description: record.description.clone(),
            category: record.category.clone(),
            pricing_source: record.pricing_source,
            import_job_id: record.import_job_id.clone(),
            parent_id: record.parent_id.clone(),
            split_index: record.split_index,
            split_total: record.split_total,
            is_split_parent: record.is_split_parent,
            amortization_periods: record.amortization_periods,
        }
    }
}
