use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a resolved rate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateKind {
    /// Rate published for the requested day.
    Historical,
    /// No rate for the day; the most recent known rate was used.
    Latest,
}

/// Units of a foreign currency per one unit of the base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuote {
    pub rate: Decimal,
    pub kind: RateKind,
}

impl RateQuote {
    pub fn historical(rate: Decimal) -> Self {
        Self {
            rate,
            kind: RateKind::Historical,
        }
    }

    pub fn latest(rate: Decimal) -> Self {
        Self {
            rate,
            kind: RateKind::Latest,
        }
    }
}
