use super::fx_model::RateQuote;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Contract for the external currency-rate lookup service.
#[async_trait]
pub trait RateResolverTrait: Send + Sync {
    /// Resolves the rate for `currency` against the base currency on `date`.
    ///
    /// Returns `Ok(None)` when the service has no usable rate.
    async fn resolve_rate(&self, currency: &str, date: NaiveDate) -> Result<Option<RateQuote>>;
}
