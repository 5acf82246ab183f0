use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use super::amortization::installment_records;
use super::records_errors::RecordError;
use super::records_model::{FinancialRecord, NewFinancialRecord};
use super::records_traits::{FinancialRecordRepositoryTrait, RecordServiceTrait};
use crate::Result;

/// Service for record operations that sit outside the import flow.
pub struct RecordService {
    repository: Arc<dyn FinancialRecordRepositoryTrait>,
}

impl RecordService {
    pub fn new(repository: Arc<dyn FinancialRecordRepositoryTrait>) -> Self {
        Self { repository }
    }

    fn load_owned_parent(&self, owner_id: &str, parent_id: &str) -> Result<FinancialRecord> {
        let parent = self
            .repository
            .get_record(parent_id)?
            .ok_or_else(|| RecordError::NotFound(parent_id.to_string()))?;

        if parent.owner_id != owner_id {
            return Err(RecordError::NotOwner(parent_id.to_string()).into());
        }
        if !parent.is_split_parent {
            return Err(RecordError::NotSplitParent(parent_id.to_string()).into());
        }
        Ok(parent)
    }
}

#[async_trait]
impl RecordServiceTrait for RecordService {
    /// Children are always regenerated from scratch, so callers never
    /// diff an old split against a new one.
    async fn resplit(
        &self,
        owner_id: &str,
        parent_id: &str,
        periods: u32,
    ) -> Result<Vec<FinancialRecord>> {
        if periods == 0 {
            return Err(RecordError::InvalidPeriods(periods).into());
        }
        let parent = self.load_owned_parent(owner_id, parent_id)?;

        let template = NewFinancialRecord::from(&parent).into_split_parent(periods);
        let children = installment_records(&template, periods)?;

        let created = self
            .repository
            .replace_split_children(parent_id, periods, children)
            .await?;

        info!(
            "Re-split record {} into {} installment(s)",
            parent_id,
            created.len()
        );
        Ok(created)
    }
}
