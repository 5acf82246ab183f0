use async_trait::async_trait;
use futures::stream::BoxStream;

use super::imports_model::*;
use super::job_transition::JobTransition;
use crate::Result;

/// Raw response body of the statement-processing service, chunk by chunk.
pub type StatementByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Trait defining the contract for import job persistence.
#[async_trait]
pub trait ImportJobRepositoryTrait: Send + Sync {
    fn get_job(&self, job_id: &str) -> Result<Option<ImportJob>>;

    fn list_jobs_for_owner(&self, owner_id: &str) -> Result<Vec<ImportJob>>;

    fn list_jobs_by_status(&self, status: ImportJobStatus) -> Result<Vec<ImportJob>>;

    /// Counts jobs of every owner in `status`.
    fn count_jobs_by_status(&self, status: ImportJobStatus) -> Result<usize>;

    fn count_owner_jobs_in(&self, owner_id: &str, statuses: &[ImportJobStatus]) -> Result<usize>;

    /// Oldest QUEUED job of the owner, by creation time.
    fn find_oldest_queued_for_owner(&self, owner_id: &str) -> Result<Option<ImportJob>>;

    /// Distinct owners that have at least one QUEUED job.
    fn list_owners_with_queued_jobs(&self) -> Result<Vec<String>>;

    async fn insert_job(&self, job: ImportJob) -> Result<ImportJob>;

    /// Applies `transition` only if the job is still in the transition's
    /// expected status, as a single conditional update.
    ///
    /// Returns `Ok(None)` when the job is missing or its status moved on.
    async fn transition(&self, job_id: &str, transition: JobTransition)
        -> Result<Option<ImportJob>>;

    /// Stores live progress. Ignored unless the job is PROCESSING.
    async fn update_progress(
        &self,
        job_id: &str,
        progress_percent: f64,
        status_message: Option<String>,
    ) -> Result<()>;

    /// Appends a warning. Ignored unless the job is PROCESSING.
    async fn append_warning(&self, job_id: &str, warning: String) -> Result<()>;

    async fn delete_job(&self, job_id: &str) -> Result<()>;
}

/// Client of the external statement-processing service.
#[async_trait]
pub trait StatementProcessorTrait: Send + Sync {
    /// Uploads the statement and returns the line-delimited event stream.
    ///
    /// Non-success responses must be reported as errors carrying the
    /// response body text.
    async fn process(&self, file: &SourceFile, payload: Vec<u8>) -> Result<StatementByteStream>;
}

/// Public surface of the import queue consumed by the request layer.
#[async_trait]
pub trait ImportQueueServiceTrait: Send + Sync {
    async fn create_job(&self, owner_id: &str, new_job: NewImportJob) -> Result<ImportJob>;
    fn get_job(&self, owner_id: &str, job_id: &str) -> Result<ImportJob>;
    fn list_jobs(&self, owner_id: &str, include_completed: bool) -> Result<Vec<ImportJob>>;
    fn get_queue_status(&self, owner_id: &str) -> Result<QueueStatus>;
    fn get_global_stats(&self) -> Result<GlobalQueueStats>;
    async fn cancel_job(&self, owner_id: &str, job_id: &str) -> Result<ImportJob>;
    async fn delete_job(&self, owner_id: &str, job_id: &str) -> Result<()>;
    async fn start_review(&self, owner_id: &str, job_id: &str) -> Result<ImportJob>;
    async fn finalize(
        &self,
        owner_id: &str,
        job_id: &str,
        selected_rows: Vec<SelectedTransaction>,
    ) -> Result<FinalizeResult>;

    /// Fails PROCESSING jobs older than the configured lease.
    /// Returns the number of jobs reaped.
    async fn reap_abandoned_jobs(&self) -> Result<usize>;

    /// Admits and runs the owner's queued jobs, oldest first, until the
    /// owner has none left or the global limit is reached.
    async fn dispatch_for_owner(&self, owner_id: &str) -> Result<()>;

    /// Starts a dispatch for every owner with a queued job.
    async fn drain_global_queue(&self) -> Result<()>;
}
