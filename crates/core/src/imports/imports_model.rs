//! Import job domain models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::records::PricingSource;

/// Lifecycle of an import job.
///
/// ```text
/// QUEUED -> PROCESSING -> READY_FOR_REVIEW -> REVIEWING -> COMPLETED
///   |           |
///   v           v
/// CANCELLED   FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportJobStatus {
    #[default]
    Queued,
    Processing,
    ReadyForReview,
    Reviewing,
    Completed,
    Failed,
    Cancelled,
}

impl ImportJobStatus {
    /// Statuses counted against the per-owner pending cap.
    pub const PENDING: [ImportJobStatus; 2] =
        [ImportJobStatus::Queued, ImportJobStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportJobStatus::Queued => "QUEUED",
            ImportJobStatus::Processing => "PROCESSING",
            ImportJobStatus::ReadyForReview => "READY_FOR_REVIEW",
            ImportJobStatus::Reviewing => "REVIEWING",
            ImportJobStatus::Completed => "COMPLETED",
            ImportJobStatus::Failed => "FAILED",
            ImportJobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal jobs never change again and are the only deletable ones.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportJobStatus::Completed | ImportJobStatus::Failed | ImportJobStatus::Cancelled
        )
    }

    pub fn is_pending(&self) -> bool {
        Self::PENDING.contains(self)
    }

    /// Whether the raw upload may still be held in this status.
    pub fn holds_payload(&self) -> bool {
        self.is_pending()
    }
}

impl std::fmt::Display for ImportJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of upload a job parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportKind {
    /// CSV or workbook parsed in-process.
    Spreadsheet,
    /// Bank statement handed to the external statement-processing service.
    Statement,
}

/// Metadata of the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub name: String,
    pub size: u64,
    pub media_type: String,
}

/// Input model for creating an import job.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub kind: ImportKind,
    pub file_name: String,
    pub media_type: String,
    pub payload: Vec<u8>,
}

/// A normalized transaction candidate awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    pub title: String,
    pub amount: Decimal,
    pub currency: String,
    /// Units of `currency` per one USD.
    pub exchange_rate: Option<Decimal>,
    pub amount_usd: Option<Decimal>,
    pub date: NaiveDate,
    pub location: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub pricing_source: PricingSource,
}

/// A reviewed row the user chose to import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedTransaction {
    #[serde(flatten)]
    pub transaction: ParsedTransaction,
    /// Spread the amount over this many monthly installments.
    #[serde(default)]
    pub amortization_periods: Option<u32>,
}

impl From<ParsedTransaction> for SelectedTransaction {
    fn from(transaction: ParsedTransaction) -> Self {
        Self {
            transaction,
            amortization_periods: None,
        }
    }
}

/// Counters recorded once a job is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportCounts {
    pub total_rows: usize,
    pub imported_count: usize,
    pub skipped_duplicates: usize,
}

/// One user-submitted ingestion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: String,
    pub owner_id: String,
    pub status: ImportJobStatus,
    pub kind: ImportKind,
    pub source_file: SourceFile,

    /// Raw upload. Only held while QUEUED or PROCESSING.
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,

    pub parsed_rows: Option<Vec<ParsedTransaction>>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub error_message: Option<String>,

    // Live progress of statement jobs
    pub progress_percent: Option<f64>,
    pub status_message: Option<String>,

    pub counts: Option<ImportCounts>,

    pub created_at: DateTime<Utc>,
    pub processing_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub reviewing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Creates a QUEUED job holding the uploaded payload.
    pub fn new(owner_id: &str, new_job: NewImportJob) -> Self {
        let size = new_job.payload.len() as u64;
        Self {
            id: Uuid::now_v7().to_string(),
            owner_id: owner_id.to_string(),
            status: ImportJobStatus::Queued,
            kind: new_job.kind,
            source_file: SourceFile {
                name: new_job.file_name,
                size,
                media_type: new_job.media_type,
            },
            payload: Some(new_job.payload),
            parsed_rows: None,
            warnings: Vec::new(),
            error_message: None,
            progress_percent: None,
            status_message: None,
            counts: None,
            created_at: Utc::now(),
            processing_at: None,
            ready_at: None,
            reviewing_at: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
        }
    }

    /// The most recent lifecycle timestamp set on this job.
    pub fn last_transition_at(&self) -> DateTime<Utc> {
        [
            self.processing_at,
            self.ready_at,
            self.reviewing_at,
            self.completed_at,
            self.failed_at,
            self.cancelled_at,
        ]
        .into_iter()
        .flatten()
        .fold(self.created_at, |latest, at| latest.max(at))
    }
}

/// Per-owner view of the queue.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub processing: Vec<ImportJob>,
    pub queued: Vec<ImportJob>,
    pub ready_for_review: Vec<ImportJob>,
    pub reviewing: Vec<ImportJob>,
    pub queued_count: usize,
}

/// Queue-wide capacity figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalQueueStats {
    pub max_concurrent: usize,
    pub current_processing: usize,
    pub available_slots: usize,
    pub total_queued: usize,
    pub total_ready_for_review: usize,
    pub total_reviewing: usize,
}

/// Result of a successful finalize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResult {
    pub job: ImportJob,
    pub counts: ImportCounts,
    /// Ids of created records (split parents, not their children).
    pub record_ids: Vec<String>,
}
