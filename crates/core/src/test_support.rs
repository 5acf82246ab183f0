//! In-memory collaborators shared by the service tests.

use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use crate::errors::{DatabaseError, Error};
use crate::fx::{RateQuote, RateResolverTrait};
use crate::imports::{
    ImportJob, ImportJobRepositoryTrait, ImportJobStatus, ImportKind, JobTransition, NewImportJob,
    SourceFile, StatementByteStream, StatementProcessorTrait,
};
use crate::records::{FinancialRecord, FinancialRecordRepositoryTrait, NewFinancialRecord};
use crate::Result;

// ============================================================================
// Import jobs
// ============================================================================

/// Job store keeping insertion order, so "oldest" is the first inserted.
#[derive(Default)]
pub struct InMemoryImportJobRepository {
    jobs: Mutex<Vec<ImportJob>>,
}

impl InMemoryImportJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ImportJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn status_of(&self, job_id: &str) -> Option<ImportJobStatus> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .map(|j| j.status)
    }

    pub fn count(&self, status: ImportJobStatus) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == status)
            .count()
    }

    /// Inserts a job as-is, bypassing the queue.
    pub fn seed(&self, job: ImportJob) {
        self.jobs.lock().unwrap().push(job);
    }
}

#[async_trait]
impl ImportJobRepositoryTrait for InMemoryImportJobRepository {
    fn get_job(&self, job_id: &str) -> Result<Option<ImportJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .cloned())
    }

    fn list_jobs_for_owner(&self, owner_id: &str) -> Result<Vec<ImportJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn list_jobs_by_status(&self, status: ImportJobStatus) -> Result<Vec<ImportJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }

    fn count_jobs_by_status(&self, status: ImportJobStatus) -> Result<usize> {
        Ok(self.count(status))
    }

    fn count_owner_jobs_in(&self, owner_id: &str, statuses: &[ImportJobStatus]) -> Result<usize> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.owner_id == owner_id && statuses.contains(&j.status))
            .count())
    }

    fn find_oldest_queued_for_owner(&self, owner_id: &str) -> Result<Option<ImportJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.owner_id == owner_id && j.status == ImportJobStatus::Queued)
            .cloned())
    }

    fn list_owners_with_queued_jobs(&self) -> Result<Vec<String>> {
        let owners: BTreeSet<String> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == ImportJobStatus::Queued)
            .map(|j| j.owner_id.clone())
            .collect();
        Ok(owners.into_iter().collect())
    }

    async fn insert_job(&self, job: ImportJob) -> Result<ImportJob> {
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn transition(
        &self,
        job_id: &str,
        transition: JobTransition,
    ) -> Result<Option<ImportJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            return Ok(None);
        };
        if transition.apply(job, Utc::now()) {
            Ok(Some(job.clone()))
        } else {
            Ok(None)
        }
    }

    async fn update_progress(
        &self,
        job_id: &str,
        progress_percent: f64,
        status_message: Option<String>,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == ImportJobStatus::Processing)
        {
            job.progress_percent = Some(progress_percent);
            job.status_message = status_message;
        }
        Ok(())
    }

    async fn append_warning(&self, job_id: &str, warning: String) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == ImportJobStatus::Processing)
        {
            job.warnings.push(warning);
        }
        Ok(())
    }

    async fn delete_job(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != job_id);
        if jobs.len() == before {
            return Err(DatabaseError::NotFound(job_id.to_string()).into());
        }
        Ok(())
    }
}

// ============================================================================
// Financial records
// ============================================================================

#[derive(Default)]
pub struct InMemoryRecordRepository {
    records: Mutex<Vec<FinancialRecord>>,
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<FinancialRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn seed(&self, record: NewFinancialRecord) -> FinancialRecord {
        let record = record.into_record(Utc::now());
        self.records.lock().unwrap().push(record.clone());
        record
    }
}

#[async_trait]
impl FinancialRecordRepositoryTrait for InMemoryRecordRepository {
    fn get_record(&self, record_id: &str) -> Result<Option<FinancialRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == record_id)
            .cloned())
    }

    fn get_records_on_dates(
        &self,
        owner_id: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<FinancialRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_id == owner_id && dates.contains(&r.date))
            .cloned()
            .collect())
    }

    fn get_split_children(&self, parent_id: &str) -> Result<Vec<FinancialRecord>> {
        let mut children: Vec<FinancialRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by_key(|r| r.split_index);
        Ok(children)
    }

    async fn create_record(&self, record: NewFinancialRecord) -> Result<FinancialRecord> {
        // Suspend like a real store would, so overlapping callers interleave.
        tokio::task::yield_now().await;
        Ok(self.seed(record))
    }

    async fn create_split(
        &self,
        parent: NewFinancialRecord,
        children: Vec<NewFinancialRecord>,
    ) -> Result<FinancialRecord> {
        let now = Utc::now();
        let parent = parent.into_record(now);
        let mut records = self.records.lock().unwrap();
        records.push(parent.clone());
        records.extend(children.into_iter().map(|c| c.into_record(now)));
        Ok(parent)
    }

    async fn replace_split_children(
        &self,
        parent_id: &str,
        periods: u32,
        children: Vec<NewFinancialRecord>,
    ) -> Result<Vec<FinancialRecord>> {
        let now = Utc::now();
        let mut records = self.records.lock().unwrap();
        let parent = records
            .iter_mut()
            .find(|r| r.id == parent_id)
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(parent_id.to_string())))?;
        parent.amortization_periods = Some(periods);

        records.retain(|r| r.parent_id.as_deref() != Some(parent_id));
        let created: Vec<FinancialRecord> =
            children.into_iter().map(|c| c.into_record(now)).collect();
        records.extend(created.iter().cloned());
        Ok(created)
    }
}

// ============================================================================
// Rates and statement service
// ============================================================================

#[derive(Default)]
pub struct StaticRateResolver {
    quotes: HashMap<String, RateQuote>,
}

impl StaticRateResolver {
    pub fn with_quote(mut self, currency: &str, quote: RateQuote) -> Self {
        self.quotes.insert(currency.to_string(), quote);
        self
    }
}

#[async_trait]
impl RateResolverTrait for StaticRateResolver {
    async fn resolve_rate(&self, currency: &str, _date: NaiveDate) -> Result<Option<RateQuote>> {
        Ok(self.quotes.get(currency).copied())
    }
}

/// Statement service double.
///
/// Each call waits for a permit on the gate (when gated), then either
/// replays the scripted chunks or hangs forever.
pub struct ScriptedStatementProcessor {
    chunks: Vec<String>,
    gate: Option<Arc<Semaphore>>,
    hang: bool,
    calls: AtomicUsize,
}

impl ScriptedStatementProcessor {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            gate: None,
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A processor that never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(&[])
        }
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatementProcessorTrait for ScriptedStatementProcessor {
    async fn process(&self, _file: &SourceFile, _payload: Vec<u8>) -> Result<StatementByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| Error::Unexpected(e.to_string()))?
                .forget();
        }
        if self.hang {
            futures::future::pending::<()>().await;
        }
        let chunks: Vec<Result<Vec<u8>>> = self
            .chunks
            .iter()
            .map(|c| Ok(c.clone().into_bytes()))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const RENT_STATEMENT: &str = "{\"type\":\"progress\",\"percent\":50,\"message\":\"Halfway\"}\n\
{\"type\":\"warning\",\"message\":\"Page 2 is rotated\"}\n\
{\"type\":\"result\",\"data\":[{\"title\":\"Rent\",\"amount\":950,\"currency\":\"USD\",\"date\":\"2024-03-01\"}]}\n";

pub fn statement_upload(name: &str) -> NewImportJob {
    NewImportJob {
        kind: ImportKind::Statement,
        file_name: name.to_string(),
        media_type: "application/pdf".to_string(),
        payload: b"%PDF-1.7".to_vec(),
    }
}

pub fn csv_upload(name: &str, content: &str) -> NewImportJob {
    NewImportJob {
        kind: ImportKind::Spreadsheet,
        file_name: name.to_string(),
        media_type: "text/csv".to_string(),
        payload: content.as_bytes().to_vec(),
    }
}

const SHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn sheet_xml(rows: &[Vec<&str>]) -> String {
    let mut xml = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><worksheet xmlns=\"{}\"><sheetData>", SHEET_NS);
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, value) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", (b'A' + c as u8) as char, r + 1);
            if value.parse::<f64>().is_ok() {
                xml.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", cell_ref, value));
            } else if !value.is_empty() {
                xml.push_str(&format!(
                    "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    cell_ref,
                    xml_escape(value)
                ));
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Builds a minimal xlsx workbook. Numeric-looking cells are stored as
/// numbers, everything else as inline strings.
pub fn xlsx_workbook(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
    let mut content_types = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    );
    let mut workbook = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><workbook xmlns=\"{}\" xmlns:r=\"{}\"><sheets>",
        SHEET_NS, REL_NS
    );
    let mut workbook_rels = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Relationships xmlns=\"{}\">",
        PKG_REL_NS
    );
    let mut parts = Vec::new();

    for (i, (name, rows)) in sheets.iter().enumerate() {
        let n = i + 1;
        workbook.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
            xml_escape(name),
            n,
            n
        ));
        workbook_rels.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"{}/worksheet\" Target=\"worksheets/sheet{}.xml\"/>",
            n, REL_NS, n
        ));
        content_types.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
            n
        ));
        parts.push((format!("xl/worksheets/sheet{}.xml", n), sheet_xml(rows)));
    }
    workbook.push_str("</sheets></workbook>");
    workbook_rels.push_str("</Relationships>");
    content_types.push_str("</Types>");

    let root_rels = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Relationships xmlns=\"{}\">\
<Relationship Id=\"rId1\" Type=\"{}/officeDocument\" Target=\"xl/workbook.xml\"/></Relationships>",
        PKG_REL_NS, REL_NS
    );

    parts.push(("[Content_Types].xml".to_string(), content_types));
    parts.push(("_rels/.rels".to_string(), root_rels));
    parts.push(("xl/workbook.xml".to_string(), workbook));
    parts.push(("xl/_rels/workbook.xml.rels".to_string(), workbook_rels));

    let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, body) in parts {
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        archive.start_file(path, options).unwrap();
        archive.write_all(body.as_bytes()).unwrap();
    }
    archive.finish().unwrap().into_inner()
}

/// Polls `condition` until it holds, panicking after about two seconds.
pub async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting until {}", what);
}

/// Gives spawned tasks a chance to run to quiescence.
pub async fn settle() {
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
