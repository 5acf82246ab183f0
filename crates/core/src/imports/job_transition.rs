//! State transitions of an import job.
//!
//! Every mutation of a job's lifecycle goes through [`JobTransition`]. Stores
//! apply a transition as one conditional update keyed by job id and the
//! transition's expected status, so racing dispatchers cannot both win.

use chrono::{DateTime, Utc};

use super::imports_constants::MAX_ERROR_MESSAGE_CHARS;
use super::imports_model::{ImportCounts, ImportJob, ImportJobStatus, ParsedTransaction};

#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// QUEUED -> PROCESSING
    StartProcessing,
    /// PROCESSING -> READY_FOR_REVIEW
    MarkReady {
        rows: Vec<ParsedTransaction>,
        warnings: Vec<String>,
    },
    /// PROCESSING -> FAILED
    Fail { message: String },
    /// READY_FOR_REVIEW -> REVIEWING
    StartReview,
    /// REVIEWING -> COMPLETED
    Complete { counts: ImportCounts },
    /// QUEUED -> CANCELLED
    Cancel,
}

impl JobTransition {
    /// Status the job must be in for the transition to apply.
    pub fn expected_status(&self) -> ImportJobStatus {
        match self {
            JobTransition::StartProcessing | JobTransition::Cancel => ImportJobStatus::Queued,
            JobTransition::MarkReady { .. } | JobTransition::Fail { .. } => {
                ImportJobStatus::Processing
            }
            JobTransition::StartReview => ImportJobStatus::ReadyForReview,
            JobTransition::Complete { .. } => ImportJobStatus::Reviewing,
        }
    }

    pub fn target_status(&self) -> ImportJobStatus {
        match self {
            JobTransition::StartProcessing => ImportJobStatus::Processing,
            JobTransition::MarkReady { .. } => ImportJobStatus::ReadyForReview,
            JobTransition::Fail { .. } => ImportJobStatus::Failed,
            JobTransition::StartReview => ImportJobStatus::Reviewing,
            JobTransition::Complete { .. } => ImportJobStatus::Completed,
            JobTransition::Cancel => ImportJobStatus::Cancelled,
        }
    }

    /// Applies the transition in place.
    ///
    /// Returns `false` without touching the job when it is not in the
    /// expected status. Timestamps never go backwards, even if `now`
    /// is behind an earlier transition.
    pub fn apply(self, job: &mut ImportJob, now: DateTime<Utc>) -> bool {
        if job.status != self.expected_status() {
            return false;
        }
        let at = now.max(job.last_transition_at());
        job.status = self.target_status();

        match self {
            JobTransition::StartProcessing => {
                job.processing_at = Some(at);
            }
            JobTransition::MarkReady { rows, warnings } => {
                job.parsed_rows = Some(rows);
                job.warnings.extend(warnings);
                job.payload = None;
                job.ready_at = Some(at);
            }
            JobTransition::Fail { message } => {
                job.error_message = Some(truncate_message(&message));
                job.payload = None;
                job.failed_at = Some(at);
            }
            JobTransition::StartReview => {
                job.reviewing_at = Some(at);
            }
            JobTransition::Complete { counts } => {
                job.counts = Some(counts);
                job.payload = None;
                job.completed_at = Some(at);
            }
            JobTransition::Cancel => {
                job.payload = None;
                job.cancelled_at = Some(at);
            }
        }
        true
    }
}

pub fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}
