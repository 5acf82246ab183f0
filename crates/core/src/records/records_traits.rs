use super::records_model::{FinancialRecord, NewFinancialRecord};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Trait defining the contract for financial record persistence.
#[async_trait]
pub trait FinancialRecordRepositoryTrait: Send + Sync {
    fn get_record(&self, record_id: &str) -> Result<Option<FinancialRecord>>;

    /// Returns every record of `owner_id` dated on one of `dates`,
    /// split parents and children included.
    fn get_records_on_dates(
        &self,
        owner_id: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<FinancialRecord>>;

    fn get_split_children(&self, parent_id: &str) -> Result<Vec<FinancialRecord>>;

    async fn create_record(&self, record: NewFinancialRecord) -> Result<FinancialRecord>;

    /// Creates a split parent and all of its children in one transaction.
    async fn create_split(
        &self,
        parent: NewFinancialRecord,
        children: Vec<NewFinancialRecord>,
    ) -> Result<FinancialRecord>;

    /// Deletes every generated child of `parent_id`, inserts `children` and
    /// stores the new period count on the parent, all in one transaction.
    async fn replace_split_children(
        &self,
        parent_id: &str,
        periods: u32,
        children: Vec<NewFinancialRecord>,
    ) -> Result<Vec<FinancialRecord>>;
}

/// Record operations exposed to the request layer.
#[async_trait]
pub trait RecordServiceTrait: Send + Sync {
    /// Regenerates the installments of an amortized parent with a new period count.
    async fn resplit(
        &self,
        owner_id: &str,
        parent_id: &str,
        periods: u32,
    ) -> Result<Vec<FinancialRecord>>;
}
