//! Turns reviewed import rows into financial records.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, info};
use rust_decimal::Decimal;

use super::imports_errors::ImportError;
use super::imports_model::{ImportCounts, SelectedTransaction};
use crate::records::{
    compute_fingerprint, installment_records, record_fingerprint, FinancialRecordRepositoryTrait,
    NewFinancialRecord,
};
use crate::Result;

/// What a finalize run persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub counts: ImportCounts,
    /// Ids of the records created, split parents standing in for their children.
    pub record_ids: Vec<String>,
}

/// A selected row that passed pre-persistence checks.
struct ReadyRow {
    row: SelectedTransaction,
    exchange_rate: Decimal,
    amount_usd: Decimal,
    periods: u32,
}

pub struct Finalizer {
    record_repository: Arc<dyn FinancialRecordRepositoryTrait>,
}

impl Finalizer {
    pub fn new(record_repository: Arc<dyn FinancialRecordRepositoryTrait>) -> Self {
        Self { record_repository }
    }

    /// Persists the selected rows of `job_id`, skipping duplicates.
    ///
    /// Every row is checked before anything is written, so a defective
    /// selection leaves the store untouched.
    pub async fn persist(
        &self,
        owner_id: &str,
        job_id: &str,
        selected_rows: Vec<SelectedTransaction>,
    ) -> Result<FinalizeSummary> {
        let total_rows = selected_rows.len();
        let ready = check_rows(selected_rows)?;

        let dates: Vec<NaiveDate> = ready
            .iter()
            .map(|r| r.row.transaction.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut seen: HashSet<String> = self
            .record_repository
            .get_records_on_dates(owner_id, &dates)?
            .iter()
            .map(record_fingerprint)
            .collect();

        let mut skipped_duplicates = 0;
        let mut record_ids = Vec::new();

        for ready_row in ready {
            let tx = &ready_row.row.transaction;
            let fingerprint = compute_fingerprint(tx.date, &tx.title, tx.amount, &tx.currency);
            if !seen.insert(fingerprint) {
                debug!("Skipping duplicate '{}' on {}", tx.title, tx.date);
                skipped_duplicates += 1;
                continue;
            }

            let periods = ready_row.periods;
            let record = new_record(owner_id, job_id, ready_row);
            let created = if periods > 1 {
                let parent = record.into_split_parent(periods);
                let children = installment_records(&parent, periods)?;
                self.record_repository.create_split(parent, children).await?
            } else {
                self.record_repository.create_record(record).await?
            };
            record_ids.push(created.id);
        }

        let counts = ImportCounts {
            total_rows,
            imported_count: record_ids.len(),
            skipped_duplicates,
        };
        info!(
            "Finalized import {}: {} imported, {} duplicates skipped",
            job_id, counts.imported_count, counts.skipped_duplicates
        );
        Ok(FinalizeSummary { counts, record_ids })
    }
}

fn check_rows(rows: Vec<SelectedTransaction>) -> Result<Vec<ReadyRow>> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| {
            let row_number = idx + 1;
            let periods = row.amortization_periods.unwrap_or(1);
            if periods == 0 {
                return Err(ImportError::InvalidSelection(format!(
                    "row {} asks for 0 amortization periods",
                    row_number
                ))
                .into());
            }
            let exchange_rate = row.transaction.exchange_rate.ok_or(
                ImportError::MissingDerivedValue {
                    row: row_number,
                    field: "exchange rate",
                },
            )?;
            let amount_usd = row
                .transaction
                .amount_usd
                .ok_or(ImportError::MissingDerivedValue {
                    row: row_number,
                    field: "USD amount",
                })?;
            Ok(ReadyRow {
                row,
                exchange_rate,
                amount_usd,
                periods,
            })
        })
        .collect()
}

fn new_record(owner_id: &str, job_id: &str, ready: ReadyRow) -> NewFinancialRecord {
    let tx = ready.row.transaction;
    NewFinancialRecord {
        id: NewFinancialRecord::generate_id(),
        owner_id: owner_id.to_string(),
        title: tx.title.trim().to_string(),
        amount: tx.amount,
        currency: tx.currency.to_uppercase(),
        exchange_rate: ready.exchange_rate,
        amount_usd: ready.amount_usd,
        date: tx.date,
        location: tx.location,
        description: tx.description,
        category: tx.category,
        pricing_source: tx.pricing_source,
        import_job_id: Some(job_id.to_string()),
        parent_id: None,
        split_index: None,
        split_total: None,
        is_split_parent: false,
        amortization_periods: None,
    }
}
