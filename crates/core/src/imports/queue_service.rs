//! Import queue controller.
//!
//! Owns the lifecycle of import jobs: admission against the global
//! concurrency limit, running the parsers, review and finalization.
//! Admission is reactive. Whenever a slot may have freed up (a job finished,
//! failed, was cancelled, deleted or finalized) a global drain is spawned;
//! nothing polls.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use super::finalizer::Finalizer;
use super::import_config::ImportQueueConfig;
use super::imports_constants::ABANDONED_JOB_MESSAGE;
use super::imports_errors::ImportError;
use super::imports_model::*;
use super::imports_traits::{
    ImportJobRepositoryTrait, ImportQueueServiceTrait, StatementProcessorTrait,
};
use super::job_transition::JobTransition;
use super::spreadsheet_parser::{parse_spreadsheet, ParseOutcome};
use super::statement_parser::{StatementObserver, StatementParser};
use crate::constants::BASE_CURRENCY;
use crate::errors::Error;
use crate::fx::RateResolverTrait;
use crate::records::FinancialRecordRepositoryTrait;
use crate::Result;

const UNEXPECTED_FAILURE_MESSAGE: &str = "Import failed unexpectedly";

/// Persists statement progress and warnings on the job as they stream in.
struct JobProgressObserver {
    job_repository: Arc<dyn ImportJobRepositoryTrait>,
    job_id: String,
}

#[async_trait]
impl StatementObserver for JobProgressObserver {
    async fn on_progress(&self, fraction: f64, message: Option<String>) -> Result<()> {
        self.job_repository
            .update_progress(&self.job_id, fraction, message)
            .await
    }

    async fn on_warning(&self, message: String) -> Result<()> {
        debug!("Statement warning for job {}: {}", self.job_id, message);
        self.job_repository
            .append_warning(&self.job_id, message)
            .await
    }
}

struct QueueInner {
    job_repository: Arc<dyn ImportJobRepositoryTrait>,
    finalizer: Finalizer,
    statement_parser: StatementParser,
    config: ImportQueueConfig,
    /// Serializes count-then-claim and count-then-insert within this process.
    admission: Mutex<()>,
    /// Jobs with a finalize call in flight.
    finalizing: Arc<StdMutex<HashSet<String>>>,
}

/// Marks a job as being finalized until dropped.
struct FinalizeClaim {
    finalizing: Arc<StdMutex<HashSet<String>>>,
    job_id: String,
}

impl FinalizeClaim {
    fn acquire(finalizing: &Arc<StdMutex<HashSet<String>>>, job_id: &str) -> Option<Self> {
        let mut in_flight = finalizing.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(job_id.to_string()) {
            return None;
        }
        Some(Self {
            finalizing: finalizing.clone(),
            job_id: job_id.to_string(),
        })
    }
}

impl Drop for FinalizeClaim {
    fn drop(&mut self) {
        let mut in_flight = self.finalizing.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.job_id);
    }
}

/// Service driving import jobs from upload to finalization.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct ImportQueueService {
    inner: Arc<QueueInner>,
}

impl ImportQueueService {
    pub fn new(
        job_repository: Arc<dyn ImportJobRepositoryTrait>,
        record_repository: Arc<dyn FinancialRecordRepositoryTrait>,
        statement_processor: Arc<dyn StatementProcessorTrait>,
        rate_resolver: Arc<dyn RateResolverTrait>,
        config: ImportQueueConfig,
    ) -> Self {
        let statement_parser = StatementParser {
            processor: statement_processor,
            resolver: rate_resolver,
            base_currency: BASE_CURRENCY.to_string(),
            timeout: config.statement_timeout,
        };
        Self {
            inner: Arc::new(QueueInner {
                job_repository,
                finalizer: Finalizer::new(record_repository),
                statement_parser,
                config,
                admission: Mutex::new(()),
                finalizing: Arc::new(StdMutex::new(HashSet::new())),
            }),
        }
    }

    pub fn config(&self) -> &ImportQueueConfig {
        &self.inner.config
    }

    fn jobs(&self) -> &dyn ImportJobRepositoryTrait {
        self.inner.job_repository.as_ref()
    }

    fn load_owned_job(&self, owner_id: &str, job_id: &str) -> Result<ImportJob> {
        let job = self
            .jobs()
            .get_job(job_id)?
            .ok_or_else(|| ImportError::JobNotFound(job_id.to_string()))?;
        if job.owner_id != owner_id {
            return Err(ImportError::NotJobOwner(job_id.to_string()).into());
        }
        Ok(job)
    }

    /// Error for a lost conditional transition, reporting the status the job
    /// actually has now.
    fn transition_rejected(&self, job_id: &str, expected: ImportJobStatus) -> Error {
        match self.jobs().get_job(job_id) {
            Ok(Some(job)) => ImportError::invalid_state(expected.as_str(), job.status).into(),
            Ok(None) => ImportError::JobNotFound(job_id.to_string()).into(),
            Err(e) => e,
        }
    }

    fn spawn_dispatch(&self, owner_id: String) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.dispatch_for_owner(&owner_id).await {
                error!("Dispatch for owner {} failed: {}", owner_id, e);
            }
        });
    }

    fn spawn_drain(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.drain_global_queue().await {
                error!("Draining the import queue failed: {}", e);
            }
        });
    }

    /// Claims the owner's oldest queued job if a processing slot is free.
    async fn claim_next_job(&self, owner_id: &str) -> Result<Option<ImportJob>> {
        let _admission = self.inner.admission.lock().await;

        loop {
            let processing = self.jobs().count_jobs_by_status(ImportJobStatus::Processing)?;
            if processing >= self.inner.config.max_concurrent_jobs {
                debug!(
                    "Admission denied for owner {}: {} of {} slots busy",
                    owner_id, processing, self.inner.config.max_concurrent_jobs
                );
                return Ok(None);
            }

            let Some(candidate) = self.jobs().find_oldest_queued_for_owner(owner_id)? else {
                return Ok(None);
            };

            match self
                .jobs()
                .transition(&candidate.id, JobTransition::StartProcessing)
                .await?
            {
                Some(job) => {
                    info!(
                        "Import job {} ({}) started processing",
                        job.id, job.source_file.name
                    );
                    return Ok(Some(job));
                }
                None => debug!("Job {} left QUEUED before it could be claimed", candidate.id),
            }
        }
    }

    async fn parse_job(&self, job: &ImportJob) -> Result<ParseOutcome> {
        let payload = job.payload.clone().ok_or_else(|| {
            Error::Unexpected(format!("Import job {} has no payload to parse", job.id))
        })?;

        match job.kind {
            ImportKind::Spreadsheet => {
                let file = job.source_file.clone();
                tokio::task::spawn_blocking(move || {
                    parse_spreadsheet(&payload, &file, BASE_CURRENCY)
                })
                .await
                .map_err(|e| Error::Unexpected(format!("Spreadsheet parser stopped: {}", e)))?
            }
            ImportKind::Statement => {
                let observer = JobProgressObserver {
                    job_repository: self.inner.job_repository.clone(),
                    job_id: job.id.clone(),
                };
                self.inner
                    .statement_parser
                    .parse(&job.source_file, payload, &observer)
                    .await
            }
        }
    }

    /// Parses a claimed job and records the outcome. Never fails: parse errors
    /// become a FAILED job.
    async fn run_job(&self, job: ImportJob) {
        let outcome = AssertUnwindSafe(self.parse_job(&job)).catch_unwind().await;

        let transition = match outcome {
            Ok(Ok(parsed)) => {
                info!(
                    "Import job {} parsed {} row(s) with {} warning(s)",
                    job.id,
                    parsed.transactions.len(),
                    parsed.warnings.len()
                );
                JobTransition::MarkReady {
                    rows: parsed.transactions,
                    warnings: parsed.warnings,
                }
            }
            Ok(Err(e)) => {
                warn!("Import job {} failed: {}", job.id, e);
                JobTransition::Fail {
                    message: e.to_string(),
                }
            }
            Err(_) => {
                error!("Import job {} panicked while parsing", job.id);
                JobTransition::Fail {
                    message: UNEXPECTED_FAILURE_MESSAGE.to_string(),
                }
            }
        };

        let target = transition.target_status();
        match self.jobs().transition(&job.id, transition).await {
            Ok(Some(_)) => debug!("Import job {} is now {}", job.id, target),
            Ok(None) => warn!(
                "Import job {} left PROCESSING before its result was stored",
                job.id
            ),
            Err(e) => error!("Could not store the result of import job {}: {}", job.id, e),
        }
    }
}

#[async_trait]
impl ImportQueueServiceTrait for ImportQueueService {
    async fn create_job(&self, owner_id: &str, new_job: NewImportJob) -> Result<ImportJob> {
        let size = new_job.payload.len() as u64;
        let max = self.inner.config.max_upload_bytes;
        if size > max {
            return Err(ImportError::FileTooLarge { size, max }.into());
        }

        let job = {
            let _admission = self.inner.admission.lock().await;
            let limit = self.inner.config.max_pending_jobs_per_owner;
            let pending = self
                .jobs()
                .count_owner_jobs_in(owner_id, &ImportJobStatus::PENDING)?;
            if pending >= limit {
                debug!("Owner {} already has {} pending imports", owner_id, pending);
                return Err(ImportError::TooManyPendingJobs { limit }.into());
            }
            self.jobs().insert_job(ImportJob::new(owner_id, new_job)).await?
        };

        info!(
            "Queued import job {} ({}, {} bytes) for owner {}",
            job.id, job.source_file.name, job.source_file.size, owner_id
        );
        self.spawn_dispatch(owner_id.to_string());
        Ok(job)
    }

    fn get_job(&self, owner_id: &str, job_id: &str) -> Result<ImportJob> {
        self.load_owned_job(owner_id, job_id)
    }

    fn list_jobs(&self, owner_id: &str, include_completed: bool) -> Result<Vec<ImportJob>> {
        let mut jobs: Vec<ImportJob> = self
            .jobs()
            .list_jobs_for_owner(owner_id)?
            .into_iter()
            .filter(|job| {
                include_completed
                    || !matches!(
                        job.status,
                        ImportJobStatus::Completed | ImportJobStatus::Cancelled
                    )
            })
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    fn get_queue_status(&self, owner_id: &str) -> Result<QueueStatus> {
        let mut jobs = self.jobs().list_jobs_for_owner(owner_id)?;
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut status = QueueStatus::default();
        for job in jobs {
            match job.status {
                ImportJobStatus::Processing => status.processing.push(job),
                ImportJobStatus::Queued => status.queued.push(job),
                ImportJobStatus::ReadyForReview => status.ready_for_review.push(job),
                ImportJobStatus::Reviewing => status.reviewing.push(job),
                _ => {}
            }
        }
        status.queued_count = status.queued.len();
        Ok(status)
    }

    fn get_global_stats(&self) -> Result<GlobalQueueStats> {
        let max_concurrent = self.inner.config.max_concurrent_jobs;
        let current_processing = self.jobs().count_jobs_by_status(ImportJobStatus::Processing)?;
        Ok(GlobalQueueStats {
            max_concurrent,
            current_processing,
            available_slots: max_concurrent.saturating_sub(current_processing),
            total_queued: self.jobs().count_jobs_by_status(ImportJobStatus::Queued)?,
            total_ready_for_review: self
                .jobs()
                .count_jobs_by_status(ImportJobStatus::ReadyForReview)?,
            total_reviewing: self.jobs().count_jobs_by_status(ImportJobStatus::Reviewing)?,
        })
    }

    async fn cancel_job(&self, owner_id: &str, job_id: &str) -> Result<ImportJob> {
        let job = self.load_owned_job(owner_id, job_id)?;
        if job.status != ImportJobStatus::Queued {
            return Err(ImportError::invalid_state(ImportJobStatus::Queued.as_str(), job.status).into());
        }

        let cancelled = self
            .jobs()
            .transition(job_id, JobTransition::Cancel)
            .await?
            .ok_or_else(|| self.transition_rejected(job_id, ImportJobStatus::Queued))?;

        info!("Import job {} cancelled", job_id);
        self.spawn_drain();
        Ok(cancelled)
    }

    async fn delete_job(&self, owner_id: &str, job_id: &str) -> Result<()> {
        let job = self.load_owned_job(owner_id, job_id)?;
        if !job.status.is_terminal() {
            return Err(ImportError::invalid_state("COMPLETED, FAILED or CANCELLED", job.status).into());
        }

        self.jobs().delete_job(job_id).await?;
        info!("Import job {} deleted", job_id);
        self.spawn_drain();
        Ok(())
    }

    async fn start_review(&self, owner_id: &str, job_id: &str) -> Result<ImportJob> {
        let job = self.load_owned_job(owner_id, job_id)?;
        if job.status != ImportJobStatus::ReadyForReview {
            return Err(ImportError::invalid_state(
                ImportJobStatus::ReadyForReview.as_str(),
                job.status,
            )
            .into());
        }

        let reviewing = self
            .jobs()
            .transition(job_id, JobTransition::StartReview)
            .await?
            .ok_or_else(|| self.transition_rejected(job_id, ImportJobStatus::ReadyForReview))?;
        info!("Import job {} opened for review", job_id);
        Ok(reviewing)
    }

    async fn finalize(
        &self,
        owner_id: &str,
        job_id: &str,
        selected_rows: Vec<SelectedTransaction>,
    ) -> Result<FinalizeResult> {
        self.load_owned_job(owner_id, job_id)?;

        // Held until the job is COMPLETED, so overlapping calls cannot both persist.
        let Some(_claim) = FinalizeClaim::acquire(&self.inner.finalizing, job_id) else {
            debug!("Finalize of job {} rejected: another call is in flight", job_id);
            return Err(ImportError::FinalizeInProgress(job_id.to_string()).into());
        };
        // Re-read under the claim; an earlier call may have completed the job.
        let job = self.load_owned_job(owner_id, job_id)?;
        if job.status != ImportJobStatus::Reviewing {
            return Err(
                ImportError::invalid_state(ImportJobStatus::Reviewing.as_str(), job.status).into(),
            );
        }

        let summary = self
            .inner
            .finalizer
            .persist(owner_id, job_id, selected_rows)
            .await?;

        let completed = self
            .jobs()
            .transition(
                job_id,
                JobTransition::Complete {
                    counts: summary.counts,
                },
            )
            .await?
            .ok_or_else(|| self.transition_rejected(job_id, ImportJobStatus::Reviewing))?;

        info!("Import job {} completed", job_id);
        self.spawn_drain();
        Ok(FinalizeResult {
            job: completed,
            counts: summary.counts,
            record_ids: summary.record_ids,
        })
    }

    async fn reap_abandoned_jobs(&self) -> Result<usize> {
        let Some(lease) = self.inner.config.processing_lease else {
            return Ok(0);
        };
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| Error::InvalidConfigValue(format!("processing lease: {}", e)))?;
        let cutoff = Utc::now() - lease;

        let mut reaped = 0;
        for job in self.jobs().list_jobs_by_status(ImportJobStatus::Processing)? {
            if job.processing_at.map_or(true, |at| at >= cutoff) {
                continue;
            }
            let fail = JobTransition::Fail {
                message: ABANDONED_JOB_MESSAGE.to_string(),
            };
            if self.jobs().transition(&job.id, fail).await?.is_some() {
                warn!("Import job {} abandoned while processing; marked FAILED", job.id);
                reaped += 1;
            }
        }

        if reaped > 0 {
            self.spawn_drain();
        }
        Ok(reaped)
    }

    async fn dispatch_for_owner(&self, owner_id: &str) -> Result<()> {
        while let Some(job) = self.claim_next_job(owner_id).await? {
            self.run_job(job).await;
            // The slot just freed may belong to another owner's queue.
            self.spawn_drain();
        }
        Ok(())
    }

    async fn drain_global_queue(&self) -> Result<()> {
        let owners = self.jobs().list_owners_with_queued_jobs()?;
        if !owners.is_empty() {
            debug!("Draining import queue for {} owner(s)", owners.len());
        }
        for owner_id in owners {
            self.spawn_dispatch(owner_id);
        }
        Ok(())
    }
}
